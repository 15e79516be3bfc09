//! Command Phase
//!
//! Detects the install/run commands the generated project needs. Primary
//! source is a dedicated model prompt; static project-marker detection
//! (Node, Python, shell scripts) supplies candidates when the model
//! yields nothing usable. Execution itself happens through the fallback
//! resolver in the pipeline driver.

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use codeloom_tools::fallback::CommandWithFallbacks;

use crate::pipeline::{extract_json, Pipeline};
use crate::prompts;

#[derive(Debug, Deserialize)]
struct DetectedCommand {
    command: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    check_command: Option<String>,
    #[serde(default)]
    fallbacks: Vec<String>,
}

pub(crate) async fn run(
    pipeline: &Pipeline,
    request: &str,
    files: &[String],
) -> Vec<CommandWithFallbacks> {
    pipeline.status("Detecting project commands");

    let prompt = prompts::commands_prompt(request, files);
    let from_model = match pipeline
        .client
        .prompt(&prompt, Some(prompts::GENERATION_SYSTEM_PROMPT))
        .await
    {
        Ok(text) => match extract_json::<Vec<DetectedCommand>>(&text) {
            Ok(commands) => commands
                .into_iter()
                .map(|c| {
                    let description = if c.description.is_empty() {
                        c.command.clone()
                    } else {
                        c.description
                    };
                    let mut spec = CommandWithFallbacks::new(c.command, description)
                        .with_fallbacks(c.fallbacks);
                    if let Some(check) = c.check_command {
                        spec = spec.with_check_command(check);
                    }
                    spec
                })
                .collect(),
            Err(error) => {
                warn!(%error, "command detection response unparseable");
                Vec::new()
            }
        },
        Err(error) => {
            warn!(%error, "command detection call failed");
            Vec::new()
        }
    };

    if !from_model.is_empty() {
        return from_model;
    }

    pipeline.status("Falling back to static command detection");
    detect_static(&pipeline.workspace())
}

/// Static project-marker detection, used when the model yields nothing.
pub(crate) fn detect_static(workspace: &Path) -> Vec<CommandWithFallbacks> {
    let mut commands = Vec::new();

    if workspace.join("package.json").is_file() {
        commands.push(
            CommandWithFallbacks::new("npm install", "install Node dependencies")
                .with_check_command("node --version")
                .with_install_check("test -d node_modules"),
        );
        commands.push(CommandWithFallbacks::new("npm start", "start the Node project"));
    }

    if workspace.join("requirements.txt").is_file() {
        commands.push(
            CommandWithFallbacks::new(
                "pip install -r requirements.txt",
                "install Python dependencies",
            )
            .with_check_command("python3 --version")
            .with_fallbacks(vec![
                "python3 -m pip install -r requirements.txt".to_string(),
            ]),
        );
        for entry in ["main.py", "app.py"] {
            if workspace.join(entry).is_file() {
                commands.push(CommandWithFallbacks::new(
                    format!("python3 {}", entry),
                    format!("run {}", entry),
                ));
                break;
            }
        }
    }

    // Shell-script projects: a top-level run/start script
    for script in ["run.sh", "start.sh"] {
        if workspace.join(script).is_file() {
            commands.push(CommandWithFallbacks::new(
                format!("sh {}", script),
                format!("run {}", script),
            ));
            break;
        }
    }

    commands
}
