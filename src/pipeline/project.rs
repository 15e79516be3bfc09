//! Project Structure Extraction
//!
//! Summarizes the workspace tree with file excerpts for repair prompts,
//! and classifies the project (web framework, JVM) for the validation
//! loop's smoke-check gating. Extraction is re-run freshly before each
//! repair request so patches are grounded in current file contents.

use std::path::Path;

/// Directories never descended into
const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "venv",
    ".venv",
    "target",
    "__pycache__",
    "dist",
];

/// Per-file excerpt budget
const FILE_EXCERPT_CHARS: usize = 800;
/// Whole-summary budget
const TOTAL_BUDGET_CHARS: usize = 12_000;
const MAX_DEPTH: usize = 4;

/// Extract a structure summary: relative paths plus truncated excerpts
/// of recognizable source files.
pub fn extract_structure(workspace: &Path) -> String {
    let mut summary = String::new();
    walk(workspace, workspace, 0, &mut summary);
    summary
}

fn walk(root: &Path, dir: &Path, depth: usize, summary: &mut String) {
    if depth > MAX_DEPTH || summary.len() >= TOTAL_BUDGET_CHARS {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        if summary.len() >= TOTAL_BUDGET_CHARS {
            return;
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        if path.is_dir() {
            if SKIP_DIRS.contains(&name.as_str()) || name.starts_with('.') {
                continue;
            }
            walk(root, &path, depth + 1, summary);
        } else {
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned();
            summary.push_str(&format!("=== {} ===\n", relative));
            if is_source_file(&name) {
                if let Ok(content) = std::fs::read_to_string(&path) {
                    summary.push_str(truncate(&content, FILE_EXCERPT_CHARS));
                    if !summary.ends_with('\n') {
                        summary.push('\n');
                    }
                }
            }
        }
    }
}

fn is_source_file(name: &str) -> bool {
    const EXTENSIONS: &[&str] = &[
        ".py", ".js", ".mjs", ".ts", ".html", ".css", ".sh", ".json", ".toml", ".txt", ".md",
        ".yml", ".yaml",
    ];
    EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

fn truncate(content: &str, limit: usize) -> &str {
    if content.len() <= limit {
        return content;
    }
    let mut end = limit;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    &content[..end]
}

/// Whether a known web framework appears in the project manifests.
pub fn is_web_project(workspace: &Path) -> bool {
    const FRAMEWORKS: &[&str] = &["flask", "fastapi", "django", "express", "koa", "fastify"];
    for manifest in ["requirements.txt", "package.json", "pyproject.toml"] {
        if let Ok(content) = std::fs::read_to_string(workspace.join(manifest)) {
            let lower = content.to_lowercase();
            if FRAMEWORKS.iter().any(|fw| lower.contains(fw)) {
                return true;
            }
        }
    }
    false
}

/// Whether this is a Kotlin/Java project (smoke checks are skipped for
/// these).
pub fn is_jvm_project(workspace: &Path) -> bool {
    ["build.gradle", "build.gradle.kts", "pom.xml"]
        .iter()
        .any(|manifest| workspace.join(manifest).is_file())
}

/// Whether the project carries anything that looks like a test suite.
pub fn has_tests(workspace: &Path) -> bool {
    if workspace.join("tests").is_dir() || workspace.join("test").is_dir() {
        return true;
    }
    std::fs::read_dir(workspace)
        .map(|entries| {
            entries.flatten().any(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.starts_with("test_") && name.ends_with(".py")
            })
        })
        .unwrap_or(false)
}
