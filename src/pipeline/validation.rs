//! Validation/Repair Loop
//!
//! Runs detected tests, optional HTTP smoke probes, and build commands,
//! up to the configured attempt budget. On failure it asks the model for
//! exact-string patches grounded in a freshly extracted project
//! structure, applies them, and retries. Exits early on a clean pass;
//! reports partial completion when attempts run out. Written files are
//! never rolled back.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::pipeline::{extract_json, project, Pipeline};
use crate::prompts;

/// Patches below this confidence are discarded
const MIN_PATCH_CONFIDENCE: f64 = 0.5;
/// Smoke probe ports, most common dev servers first
const SMOKE_PORTS: &[u16] = &[5000, 3000, 8000, 8080];

#[derive(Debug, Clone, Deserialize)]
pub struct Patch {
    pub file_path: String,
    pub old_string: String,
    pub new_string: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Run the loop. `Ok(true)` is a clean pass, `Ok(false)` partial
/// completion after the budget; cancellation is checked at the top of
/// every attempt.
pub(crate) async fn run(pipeline: &Pipeline) -> EngineResult<bool> {
    let workspace = pipeline.workspace();

    for attempt in 1..=pipeline.config.max_validation_attempts {
        if pipeline.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        pipeline.status(format!(
            "Validation attempt {}/{}",
            attempt, pipeline.config.max_validation_attempts
        ));

        let failures = validate_once(pipeline, &workspace).await;
        if failures.is_empty() {
            pipeline.status("Validation passed");
            return Ok(true);
        }

        warn!(attempt, failures = failures.len(), "validation failed");
        if attempt == pipeline.config.max_validation_attempts {
            break;
        }
        repair(pipeline, &workspace, &failures.join("\n\n")).await;
    }

    pipeline.status("Validation attempts exhausted, reporting partial completion");
    Ok(false)
}

/// One validation pass: tests, smoke probes (advisory), build.
async fn validate_once(pipeline: &Pipeline, workspace: &Path) -> Vec<String> {
    let mut failures = Vec::new();

    if let Some(test_command) = detect_test_command(workspace) {
        pipeline.status(format!("Running tests: {}", test_command));
        let output = pipeline.shell.run(&test_command, workspace).await;
        if !output.success {
            failures.push(format!("`{}` failed:\n{}", test_command, output.output));
        }
    }

    // Smoke probes are advisory: a dev server may simply not be running
    // in this environment.
    if project::is_web_project(workspace) && !project::is_jvm_project(workspace) {
        if let Some(port) = smoke_probe().await {
            info!(port, "HTTP smoke probe reachable");
        } else {
            warn!("no HTTP endpoint reachable on common ports");
        }
    }

    if let Some(build_command) = detect_build_command(workspace) {
        pipeline.status(format!("Running build: {}", build_command));
        let output = pipeline.shell.run(&build_command, workspace).await;
        if !output.success {
            failures.push(format!("`{}` failed:\n{}", build_command, output.output));
        }
    }

    failures
}

async fn repair(pipeline: &Pipeline, workspace: &Path, failure_output: &str) {
    // Structure is re-extracted every attempt so patches see current
    // file contents.
    let structure = project::extract_structure(workspace);
    let prompt = prompts::repair_prompt(failure_output, &structure);
    let text = match pipeline
        .client
        .prompt(&prompt, Some(prompts::GENERATION_SYSTEM_PROMPT))
        .await
    {
        Ok(text) => text,
        Err(error) => {
            warn!(%error, "repair call failed");
            return;
        }
    };
    let patches = match extract_json::<Vec<Patch>>(&text) {
        Ok(patches) => patches,
        Err(error) => {
            warn!(%error, "repair response unparseable");
            return;
        }
    };

    for patch in patches {
        if patch.confidence < MIN_PATCH_CONFIDENCE {
            info!(file = %patch.file_path, confidence = patch.confidence, "skipping low-confidence patch");
            continue;
        }
        match apply_patch(workspace, &patch) {
            Ok(true) => pipeline.status(format!("Patched {}", patch.file_path)),
            Ok(false) => warn!(file = %patch.file_path, "patch target text not found"),
            Err(error) => warn!(file = %patch.file_path, %error, "patch failed"),
        }
    }
}

/// Apply one exact-string patch. Returns whether the target text was
/// found.
pub(crate) fn apply_patch(workspace: &Path, patch: &Patch) -> std::io::Result<bool> {
    let path = workspace.join(&patch.file_path);
    let content = std::fs::read_to_string(&path)?;
    if !content.contains(&patch.old_string) {
        return Ok(false);
    }
    let updated = content.replacen(&patch.old_string, &patch.new_string, 1);
    std::fs::write(&path, updated)?;
    Ok(true)
}

fn detect_test_command(workspace: &Path) -> Option<String> {
    if project::has_tests(workspace) && workspace.join("requirements.txt").is_file() {
        return Some("python3 -m pytest -x -q".to_string());
    }
    if let Ok(manifest) = std::fs::read_to_string(workspace.join("package.json")) {
        if manifest.contains("\"test\"") {
            return Some("npm test".to_string());
        }
    }
    None
}

fn detect_build_command(workspace: &Path) -> Option<String> {
    if let Ok(manifest) = std::fs::read_to_string(workspace.join("package.json")) {
        if manifest.contains("\"build\"") {
            return Some("npm run build".to_string());
        }
    }
    None
}

/// Probe common local dev-server ports; first reachable port wins.
async fn smoke_probe() -> Option<u16> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .ok()?;
    for &port in SMOKE_PORTS {
        let url = format!("http://127.0.0.1:{}/", port);
        if client.get(&url).send().await.is_ok() {
            return Some(port);
        }
    }
    None
}
