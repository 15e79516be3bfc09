//! Multi-Phase Generation Pipeline
//!
//! One parameterized pipeline: file-list planning, cross-file metadata,
//! per-file code generation, command detection, and a validation/repair
//! loop. A [`PhasePlan`] selected by intent decides which phases run, so
//! the three task shapes share one control flow instead of three parallel
//! ones.
//!
//! Module Organization:
//! - `file_list`: phase 1, file path planning
//! - `metadata`: phase 2, per-file metadata with count-match validation
//! - `codegen`: phase 3, sequential per-file generation with lint/fix
//! - `commands`: phase 4, command detection (model + static markers)
//! - `validation`: phase 5, validate/repair retry loop
//! - `project`: workspace structure extraction for repair prompts

pub mod codegen;
pub mod commands;
pub mod file_list;
pub mod metadata;
pub mod project;
pub mod validation;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::info;

use codeloom_core::config::EngineConfig;
use codeloom_core::events::{ProgressEvent, Todo, TodoStatus};
use codeloom_tools::fallback::{FailureAnalyst, FallbackResolver};
use codeloom_tools::shell::ShellExecutor;

use crate::error::{EngineError, EngineResult};
use crate::intent::Intent;
use crate::orchestrator::ModelClient;

// ============================================================================
// Phase plan
// ============================================================================

/// Which phases run for a given intent. The shared control flow in
/// [`Pipeline::run`] consults this instead of branching per intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhasePlan {
    pub generate_files: bool,
    pub detect_commands: bool,
    pub run_validation: bool,
}

impl PhasePlan {
    pub fn for_intent(intent: Intent) -> Self {
        match intent {
            Intent::CreateNew => Self {
                generate_files: true,
                detect_commands: true,
                run_validation: true,
            },
            // Existing project: repairs happen in the validation loop,
            // not by regenerating files wholesale.
            Intent::DebugUpgrade => Self {
                generate_files: false,
                detect_commands: true,
                run_validation: true,
            },
            Intent::TestOnly => Self {
                generate_files: false,
                detect_commands: false,
                run_validation: true,
            },
        }
    }
}

/// Outcome summary of one pipeline run. Written files are never rolled
/// back; `completed` is false when the attempt budget ran out.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub files_written: Vec<String>,
    pub commands_run: usize,
    pub validation_passed: bool,
    pub completed: bool,
}

// ============================================================================
// Progress checkpoints
// ============================================================================

/// Projects pipeline progress as `Todo` updates. At most one item is
/// `in_progress` at a time.
pub(crate) struct TodoTracker {
    todos: Vec<Todo>,
    events: UnboundedSender<ProgressEvent>,
}

impl TodoTracker {
    fn new(descriptions: Vec<&str>, events: UnboundedSender<ProgressEvent>) -> Self {
        let todos = descriptions.into_iter().map(Todo::pending).collect();
        let tracker = Self { todos, events };
        tracker.publish();
        tracker
    }

    fn publish(&self) {
        let _ = self.events.send(ProgressEvent::TodoUpdate {
            todos: self.todos.clone(),
        });
    }

    fn start(&mut self, index: usize) {
        for (i, todo) in self.todos.iter_mut().enumerate() {
            if todo.status == TodoStatus::InProgress {
                todo.status = TodoStatus::Completed;
            }
            if i == index {
                todo.status = TodoStatus::InProgress;
            }
        }
        self.publish();
    }

    fn complete(&mut self, index: usize) {
        if let Some(todo) = self.todos.get_mut(index) {
            todo.status = TodoStatus::Completed;
        }
        self.publish();
    }

    fn cancel_remaining(&mut self) {
        for todo in &mut self.todos {
            if todo.status == TodoStatus::Pending || todo.status == TodoStatus::InProgress {
                todo.status = TodoStatus::Cancelled;
            }
        }
        self.publish();
    }
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct Pipeline {
    pub(crate) client: ModelClient,
    pub(crate) shell: Arc<dyn ShellExecutor>,
    pub(crate) analyst: Option<Arc<dyn FailureAnalyst>>,
    pub(crate) config: EngineConfig,
    pub(crate) events: UnboundedSender<ProgressEvent>,
    pub(crate) cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(
        client: ModelClient,
        shell: Arc<dyn ShellExecutor>,
        config: EngineConfig,
        events: UnboundedSender<ProgressEvent>,
    ) -> Self {
        Self {
            client,
            shell,
            analyst: None,
            config,
            events,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_analyst(mut self, analyst: Arc<dyn FailureAnalyst>) -> Self {
        self.analyst = Some(analyst);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub(crate) fn workspace(&self) -> PathBuf {
        PathBuf::from(&self.config.workspace_root)
    }

    pub(crate) fn status(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        let _ = self.events.send(ProgressEvent::CommandStatus { message });
    }

    pub(crate) fn resolver(&self) -> FallbackResolver {
        let mut resolver =
            FallbackResolver::new(Arc::clone(&self.shell)).with_events(self.events.clone());
        if let Some(analyst) = &self.analyst {
            resolver = resolver.with_analyst(Arc::clone(analyst));
        }
        resolver
    }

    /// Run the phases the intent's plan selects. Phase failures surface
    /// as `EngineError::PhaseFailed`; partial progress is preserved.
    pub async fn run(&self, request: &str, intent: Intent) -> EngineResult<PipelineReport> {
        let plan = PhasePlan::for_intent(intent);
        let mut report = PipelineReport::default();

        let mut labels = Vec::new();
        if plan.generate_files {
            labels.push("Plan project files");
            labels.push("Describe file metadata");
            labels.push("Generate code");
        }
        if plan.detect_commands {
            labels.push("Detect and run commands");
        }
        if plan.run_validation {
            labels.push("Validate project");
        }
        let mut todos = TodoTracker::new(labels, self.events.clone());
        let mut step = 0;

        let mut detected_files: Vec<String> = Vec::new();

        if plan.generate_files {
            todos.start(step);
            let files = file_list::run(self, request).await?;
            todos.complete(step);
            step += 1;

            todos.start(step);
            let metadata = metadata::run(self, request, &files).await?;
            todos.complete(step);
            step += 1;

            todos.start(step);
            report.files_written = codegen::run(self, request, &metadata).await?;
            todos.complete(step);
            step += 1;

            detected_files = files;
        }

        if plan.detect_commands {
            if self.cancel.is_cancelled() {
                todos.cancel_remaining();
                return Err(EngineError::Cancelled);
            }
            todos.start(step);
            let specs = commands::run(self, request, &detected_files).await;
            report.commands_run = specs.len();
            let resolver = self.resolver();
            let workspace = self.workspace();
            for spec in &specs {
                resolver.run(spec, &workspace).await;
            }
            todos.complete(step);
            step += 1;
        }

        if plan.run_validation {
            match validation::run(self).await {
                Ok(passed) => {
                    report.validation_passed = passed;
                    todos.complete(step);
                }
                Err(EngineError::Cancelled) => {
                    todos.cancel_remaining();
                    return Err(EngineError::Cancelled);
                }
                Err(error) => return Err(error),
            }
        }

        report.completed = true;
        Ok(report)
    }
}

// ============================================================================
// Structured output helpers
// ============================================================================

/// Strip a leading/trailing markdown code fence from generated content.
pub fn strip_code_fences(content: &str) -> String {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut lines: Vec<&str> = trimmed.lines().collect();
    lines.remove(0);
    if lines.last().is_some_and(|l| l.trim() == "```") {
        lines.pop();
    }
    lines.join("\n")
}

/// Extract the first JSON value from model text that may surround it with
/// prose or fences.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    let cleaned = strip_code_fences(text);
    if let Ok(value) = serde_json::from_str::<T>(&cleaned) {
        return Ok(value);
    }

    // Fall back to the outermost bracket/brace span.
    for (open, close) in [('[', ']'), ('{', '}')] {
        if let (Some(start), Some(end)) = (cleaned.find(open), cleaned.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str::<T>(&cleaned[start..=end]) {
                    return Ok(value);
                }
            }
        }
    }
    Err(format!(
        "no parseable JSON in model output ({} chars)",
        text.len()
    ))
}

/// Whether the workspace contains any regular file (used by intent
/// detection and phase selection).
pub fn workspace_has_files(root: &Path) -> bool {
    std::fs::read_dir(root)
        .map(|mut entries| entries.any(|e| e.is_ok()))
        .unwrap_or(false)
}
