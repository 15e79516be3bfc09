//! Code-Generation Phase
//!
//! One model call per file, sequential by design: later files are seeded
//! with truncated excerpts of already-generated related files, so the
//! order carries a data dependency and must not be parallelized.
//! Generated content is stripped of code fences and written immediately;
//! a per-file lint failure triggers exactly one model fix attempt.

use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

use crate::error::EngineResult;
use crate::pipeline::metadata::FileMetadata;
use crate::pipeline::{strip_code_fences, Pipeline};
use crate::prompts;

/// Per-file excerpt budget in the coherence context
const EXCERPT_LIMIT: usize = 1200;

pub(crate) async fn run(
    pipeline: &Pipeline,
    request: &str,
    metadata: &[FileMetadata],
) -> EngineResult<Vec<String>> {
    let workspace = pipeline.workspace();
    let mut generated: HashMap<String, String> = HashMap::new();
    let mut written = Vec::new();

    for (index, entry) in metadata.iter().enumerate() {
        pipeline.status(format!(
            "Generating {} ({}/{})",
            entry.file_path,
            index + 1,
            metadata.len()
        ));

        let excerpts = related_excerpts(entry, metadata, &generated);
        let prompt = prompts::codegen_prompt(
            request,
            &entry.file_path,
            &entry.description,
            &entry.exports,
            &entry.imports,
            &excerpts,
        );
        let raw = pipeline
            .client
            .prompt(&prompt, Some(prompts::GENERATION_SYSTEM_PROMPT))
            .await?;
        let mut content = strip_code_fences(&raw);

        // Written immediately, not buffered for the batch.
        write_file(&workspace, &entry.file_path, &content)?;

        if let Some(findings) = lint(pipeline, &entry.file_path).await {
            warn!(file = %entry.file_path, "lint findings, attempting fix");
            pipeline.status(format!("Fixing lint findings in {}", entry.file_path));
            let fix_prompt = prompts::lint_fix_prompt(&entry.file_path, &content, &findings);
            match pipeline
                .client
                .prompt(&fix_prompt, Some(prompts::GENERATION_SYSTEM_PROMPT))
                .await
            {
                Ok(fixed) => {
                    content = strip_code_fences(&fixed);
                    write_file(&workspace, &entry.file_path, &content)?;
                }
                Err(error) => warn!(file = %entry.file_path, %error, "fix attempt failed"),
            }
        }

        generated.insert(entry.file_path.clone(), content);
        written.push(entry.file_path.clone());
    }

    Ok(written)
}

/// Excerpts of already-generated files this one relates to, with their
/// key exports and imports, truncated to the per-file budget.
fn related_excerpts(
    entry: &FileMetadata,
    metadata: &[FileMetadata],
    generated: &HashMap<String, String>,
) -> String {
    let mut excerpts = String::new();
    for relation in &entry.relationships {
        let Some(content) = generated.get(relation) else {
            continue;
        };
        let related_meta = metadata.iter().find(|m| &m.file_path == relation);
        excerpts.push_str(&format!("--- {} ---\n", relation));
        if let Some(meta) = related_meta {
            if !meta.exports.is_empty() {
                excerpts.push_str(&format!("exports: {}\n", meta.exports.join(", ")));
            }
        }
        excerpts.push_str(truncate(content, EXCERPT_LIMIT));
        excerpts.push('\n');
    }
    excerpts
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

fn write_file(workspace: &Path, relative: &str, content: &str) -> EngineResult<()> {
    let path = workspace.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(codeloom_core::error::CoreError::from)?;
    }
    std::fs::write(&path, content).map_err(codeloom_core::error::CoreError::from)?;
    Ok(())
}

/// Syntax-level lint for the languages the pipeline commonly generates.
/// Returns findings text on failure, `None` on a clean pass or when no
/// linter applies.
async fn lint(pipeline: &Pipeline, relative: &str) -> Option<String> {
    let command = match Path::new(relative).extension().and_then(|e| e.to_str()) {
        Some("py") => format!("python3 -m py_compile {}", relative),
        Some("js") | Some("mjs") => format!("node --check {}", relative),
        Some("sh") => format!("sh -n {}", relative),
        _ => return None,
    };
    let output = pipeline.shell.run(&command, &pipeline.workspace()).await;
    if output.success {
        None
    } else {
        Some(output.output)
    }
}
