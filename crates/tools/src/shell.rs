//! Shell Executor
//!
//! The process-spawning collaborator behind command execution, linting,
//! and validation runs. Kept behind a trait so the fallback resolver and
//! the pipeline can be tested with scripted shells.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Outcome of one shell command.
#[derive(Debug, Clone, PartialEq)]
pub struct ShellOutput {
    /// Combined stdout and stderr, in that order
    pub output: String,
    /// Whether the process exited with status zero
    pub success: bool,
}

impl ShellOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
        }
    }
}

/// Runs shell commands in a working directory.
#[async_trait]
pub trait ShellExecutor: Send + Sync {
    async fn run(&self, command: &str, cwd: &Path) -> ShellOutput;
}

/// Default executor over `sh -c` via tokio's process API.
pub struct SystemShell;

#[async_trait]
impl ShellExecutor for SystemShell {
    async fn run(&self, command: &str, cwd: &Path) -> ShellOutput {
        debug!(command, cwd = %cwd.display(), "running shell command");
        let result = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .output()
            .await;

        match result {
            Ok(output) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.is_empty() {
                    if !combined.is_empty() && !combined.ends_with('\n') {
                        combined.push('\n');
                    }
                    combined.push_str(&stderr);
                }
                ShellOutput {
                    output: combined,
                    success: output.status.success(),
                }
            }
            Err(error) => ShellOutput::failed(format!("failed to spawn shell: {}", error)),
        }
    }
}
