//! Command Fallback Resolver
//!
//! Executes shell commands with pre-flight availability checks, ordered
//! fallback remedies, output keyword failure detection, and AI-assisted
//! failure analysis. A zero exit status is not trusted on its own; output
//! is scanned for failure vocabulary because install scripts and test
//! runners routinely fail while exiting cleanly.
//!
//! Module Organization:
//! - `CommandWithFallbacks` / `FallbackPlan` / `FailureAnalysis`: ephemeral
//!   per-attempt data
//! - `FailureAnalyst`: seam for the model-backed analyzer (implemented in
//!   the engine crate)
//! - `FallbackResolver`: the algorithm

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use codeloom_core::events::ProgressEvent;

use crate::shell::ShellExecutor;

// ============================================================================
// Data model
// ============================================================================

/// A command plus its ordered remedies. Created and consumed within one
/// execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandWithFallbacks {
    /// The command the project actually needs to run
    pub primary_command: String,
    /// Human-readable purpose, used in progress events
    pub description: String,
    /// Ordered availability remedies, first success wins
    #[serde(default)]
    pub fallbacks: Vec<String>,
    /// Pre-flight availability probe (e.g. `python3 --version`)
    #[serde(default)]
    pub check_command: Option<String>,
    /// Probe that tells whether dependencies are already installed, so
    /// install-flavored fallbacks can be skipped
    #[serde(default)]
    pub install_check: Option<String>,
}

impl CommandWithFallbacks {
    pub fn new(primary: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            primary_command: primary.into(),
            description: description.into(),
            fallbacks: Vec::new(),
            check_command: None,
            install_check: None,
        }
    }

    pub fn with_fallbacks(mut self, fallbacks: Vec<String>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    pub fn with_check_command(mut self, check: impl Into<String>) -> Self {
        self.check_command = Some(check.into());
        self
    }

    pub fn with_install_check(mut self, check: impl Into<String>) -> Self {
        self.install_check = Some(check.into());
        self
    }
}

/// One remedy proposed by failure analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackPlan {
    pub command: String,
    pub description: String,
    /// Whether the primary command should be retried after this plan
    #[serde(default)]
    pub should_retry_original: bool,
}

/// Diagnosis of a failing command. Not persisted beyond the attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureAnalysis {
    pub reason: String,
    #[serde(default)]
    pub fallback_plans: Vec<FallbackPlan>,
}

/// Seam for AI-assisted failure diagnosis. The engine crate provides the
/// model-backed implementation; tests script it.
#[async_trait]
pub trait FailureAnalyst: Send + Sync {
    async fn analyze(
        &self,
        command: &str,
        output: &str,
        project_markers: &[String],
    ) -> Option<FailureAnalysis>;
}

// ============================================================================
// Resolver
// ============================================================================

/// Failure vocabulary scanned in command output. Exit status alone is not
/// trusted.
const FAILURE_KEYWORDS: &[&str] = &[
    "error:",
    "error ",
    "failed",
    "failure",
    "cannot ",
    "can't ",
    "unable to",
    "permission denied",
    "command not found",
    "no such file",
    "traceback",
    "modulenotfounderror",
    "exception",
    "fatal:",
];

/// Most plans the analyst may run per failure
const MAX_ANALYSIS_PLANS: usize = 2;
/// Output tail handed to the analyst
const ANALYSIS_OUTPUT_LIMIT: usize = 2000;

/// Runs a [`CommandWithFallbacks`] to completion, emitting human-readable
/// `CommandStatus` events for every sub-step in program order.
pub struct FallbackResolver {
    shell: Arc<dyn ShellExecutor>,
    analyst: Option<Arc<dyn FailureAnalyst>>,
    events: Option<UnboundedSender<ProgressEvent>>,
}

impl FallbackResolver {
    pub fn new(shell: Arc<dyn ShellExecutor>) -> Self {
        Self {
            shell,
            analyst: None,
            events: None,
        }
    }

    pub fn with_analyst(mut self, analyst: Arc<dyn FailureAnalyst>) -> Self {
        self.analyst = Some(analyst);
        self
    }

    pub fn with_events(mut self, events: UnboundedSender<ProgressEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn status(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        if let Some(events) = &self.events {
            let _ = events.send(ProgressEvent::CommandStatus { message });
        }
    }

    /// Run the command with full fallback handling. Returns whether the
    /// primary command (or an accepted substitute) ultimately succeeded.
    pub async fn run(&self, spec: &CommandWithFallbacks, workspace: &Path) -> bool {
        let mut used_venv = false;

        // Phase 1: availability pre-check and ordered fallbacks
        if let Some(check) = &spec.check_command {
            self.status(format!("Checking availability: {}", check));
            let probe = self.shell.run(check, workspace).await;
            if probe.success {
                self.status(format!("{}: environment already satisfied", spec.description));
            } else {
                self.run_availability_fallbacks(spec, workspace, check, &mut used_venv)
                    .await;
            }
        }

        // Phase 2: primary command
        self.status(format!("Running: {}", spec.primary_command));
        let primary = self.shell.run(&spec.primary_command, workspace).await;
        if command_succeeded(&primary.output, primary.success) {
            self.status(format!("{}: succeeded", spec.description));
            return true;
        }
        warn!(command = %spec.primary_command, "command failed");
        self.status(format!(
            "{} failed, analyzing output",
            spec.primary_command
        ));

        // Phase 3: AI failure analysis, at most two plans
        if let Some(analyst) = &self.analyst {
            let tail = output_tail(&primary.output, ANALYSIS_OUTPUT_LIMIT);
            let markers = detect_project_markers(workspace);
            if let Some(analysis) = analyst
                .analyze(&spec.primary_command, tail, &markers)
                .await
            {
                self.status(format!("Failure analysis: {}", analysis.reason));
                let mut retry_original = false;
                for plan in analysis.fallback_plans.iter().take(MAX_ANALYSIS_PLANS) {
                    self.status(format!("Trying remedy: {}", plan.description));
                    let result = self.shell.run(&plan.command, workspace).await;
                    if !command_succeeded(&result.output, result.success) {
                        self.status(format!("Remedy failed: {}", plan.command));
                    }
                    retry_original |= plan.should_retry_original;
                }
                if retry_original {
                    self.status(format!("Retrying: {}", spec.primary_command));
                    let retried = self.shell.run(&spec.primary_command, workspace).await;
                    if command_succeeded(&retried.output, retried.success) {
                        self.status(format!("{}: succeeded after remedy", spec.description));
                        return true;
                    }
                }
            }
        }

        // Phase 4: venv activation as a last resort for Python commands
        if !used_venv
            && is_python_flavored(&spec.primary_command)
            && workspace.join("venv").is_dir()
        {
            let venv_command = format!(". venv/bin/activate && {}", spec.primary_command);
            self.status(format!("Retrying inside venv: {}", spec.primary_command));
            let result = self.shell.run(&venv_command, workspace).await;
            if command_succeeded(&result.output, result.success) {
                self.status(format!("{}: succeeded inside venv", spec.description));
                return true;
            }
        }

        self.status(format!("{}: failed", spec.description));
        false
    }

    async fn run_availability_fallbacks(
        &self,
        spec: &CommandWithFallbacks,
        workspace: &Path,
        check: &str,
        used_venv: &mut bool,
    ) {
        for fallback in &spec.fallbacks {
            // Skip install fallbacks when dependencies are already present
            if looks_like_install(fallback) {
                if let Some(install_check) = &spec.install_check {
                    let probe = self.shell.run(install_check, workspace).await;
                    if probe.success {
                        self.status(format!(
                            "Dependencies already installed, skipping: {}",
                            fallback
                        ));
                        continue;
                    }
                }
            }

            self.status(format!("Fallback: {}", fallback));
            let result = self.shell.run(fallback, workspace).await;
            if looks_like_environment_setup(fallback) {
                *used_venv = true;
                // Environment may have changed; re-probe before deciding
                let probe = self.shell.run(check, workspace).await;
                if probe.success {
                    self.status("Environment ready after fallback".to_string());
                    return;
                }
            } else if result.success {
                return;
            }
        }
    }
}

// ============================================================================
// Classification helpers
// ============================================================================

/// Success requires a clean exit and no failure vocabulary in the output.
pub fn command_succeeded(output: &str, exit_success: bool) -> bool {
    if !exit_success {
        return false;
    }
    let lower = output.to_lowercase();
    !FAILURE_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn looks_like_environment_setup(command: &str) -> bool {
    let lower = command.to_lowercase();
    lower.contains("venv") || lower.contains("virtualenv") || lower.contains("activate")
}

fn looks_like_install(command: &str) -> bool {
    let lower = command.to_lowercase();
    lower.contains("install") || lower.contains("pip ") || lower.contains("npm i")
}

fn is_python_flavored(command: &str) -> bool {
    let lower = command.to_lowercase();
    lower.starts_with("python")
        || lower.starts_with("pip")
        || lower.starts_with("pytest")
        || lower.contains(" python")
        || lower.contains(" pip ")
}

fn output_tail(output: &str, limit: usize) -> &str {
    let len = output.len();
    if len <= limit {
        return output;
    }
    let mut start = len - limit;
    while !output.is_char_boundary(start) {
        start += 1;
    }
    &output[start..]
}

/// Package manifests present in the workspace, handed to the analyst.
pub fn detect_project_markers(workspace: &Path) -> Vec<String> {
    const MANIFESTS: &[&str] = &[
        "package.json",
        "requirements.txt",
        "pyproject.toml",
        "Cargo.toml",
        "go.mod",
        "build.gradle",
        "pom.xml",
    ];
    MANIFESTS
        .iter()
        .filter(|name| workspace.join(name).is_file())
        .map(|name| name.to_string())
        .collect()
}
