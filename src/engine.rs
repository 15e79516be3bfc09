//! Engine Facade
//!
//! The one type callers hold. Owns the conversation state and the event
//! channel, and routes each message either through the conversational
//! turn loop or, for generation requests, through intent detection and
//! the multi-phase pipeline. Exactly one terminal event (`Done`, `Error`,
//! or `KeysExhausted`) is emitted per handled message.

use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::info;

use codeloom_core::config::EngineConfig;
use codeloom_core::events::ProgressEvent;
use codeloom_core::message::{Message, Part};
use codeloom_core::tool_trait::ToolRegistry;
use codeloom_llm::credentials::KeySource;
use codeloom_llm::provider::LlmProvider;
use codeloom_tools::bridge::ToolBridge;
use codeloom_tools::shell::{ShellExecutor, SystemShell};

use crate::analyst::ModelAnalyst;
use crate::error::EngineResult;
use crate::intent::detect_intent;
use crate::orchestrator::{ConversationState, ModelClient, Orchestrator};
use crate::pipeline::{workspace_has_files, Pipeline, PipelineReport};
use crate::prompts;

/// How a message should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// Streaming-style conversational turn loop with tools
    Chat,
    /// Non-streaming multi-phase generation pipeline
    Generate,
}

/// Memory summary length handed to intent detection
const MEMORY_SUMMARY_CHARS: usize = 500;

pub struct Engine {
    client: ModelClient,
    bridge: Arc<ToolBridge>,
    shell: Arc<dyn ShellExecutor>,
    config: EngineConfig,
    state: ConversationState,
    events: UnboundedSender<ProgressEvent>,
    cancel: CancellationToken,
}

impl Engine {
    /// Create an engine and the event stream its caller drains.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        keys: Arc<dyn KeySource>,
        config: EngineConfig,
    ) -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = unbounded_channel();
        let engine = Self {
            client: ModelClient::new(provider, keys)
                .with_timeouts(config.interactive_timeout_secs, config.generation_timeout_secs),
            bridge: Arc::new(ToolBridge::new(Arc::new(ToolRegistry::new()))),
            shell: Arc::new(SystemShell),
            config,
            state: ConversationState::new(),
            events: tx,
            cancel: CancellationToken::new(),
        };
        (engine, rx)
    }

    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.bridge = Arc::new(ToolBridge::new(registry));
        self
    }

    pub fn with_shell(mut self, shell: Arc<dyn ShellExecutor>) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Current conversation history snapshot.
    pub fn history(&self) -> &[Message] {
        self.state.history()
    }

    /// Clear all conversation state.
    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Handle one user message to a terminal event.
    pub async fn handle_message(&mut self, text: &str, mode: EngineMode) -> EngineResult<()> {
        match mode {
            EngineMode::Chat => self.run_chat(text).await,
            EngineMode::Generate => self.run_generate(text).await.map(|_| ()),
        }
    }

    async fn run_chat(&mut self, text: &str) -> EngineResult<()> {
        let orchestrator = Orchestrator::new(
            self.client.clone(),
            Arc::clone(&self.bridge),
            self.events.clone(),
        )
        .with_system_prompt(prompts::CHAT_SYSTEM_PROMPT)
        .with_max_turns(self.config.max_turns)
        .with_cancellation(self.cancel.clone());

        orchestrator.run(&mut self.state, Some(text)).await
    }

    async fn run_generate(&mut self, text: &str) -> EngineResult<PipelineReport> {
        let workspace = std::path::PathBuf::from(&self.config.workspace_root);
        let memory = self.memory_summary();
        let intent = detect_intent(text, &memory, workspace_has_files(&workspace));
        info!(?intent, "generation request classified");

        let analyst = Arc::new(ModelAnalyst::new(self.client.clone()));
        let pipeline = Pipeline::new(
            self.client.clone(),
            Arc::clone(&self.shell),
            self.config.clone(),
            self.events.clone(),
        )
        .with_analyst(analyst)
        .with_cancellation(self.cancel.clone());

        self.state.push(Message::user(text));
        match pipeline.run(text, intent).await {
            Ok(report) => {
                let mut summary = Message::model(format!(
                    "Generated {} files, ran {} commands.",
                    report.files_written.len(),
                    report.commands_run
                ));
                if !report.validation_passed {
                    summary.push(Part::text(
                        "Validation did not fully pass; partial completion.",
                    ));
                }
                self.state.push(summary);
                self.events.send(ProgressEvent::Done).ok();
                Ok(report)
            }
            Err(error) => {
                if error.is_keys_exhausted() {
                    self.events.send(ProgressEvent::KeysExhausted).ok();
                } else {
                    self.events
                        .send(ProgressEvent::Error {
                            message: error.to_string(),
                        })
                        .ok();
                }
                Err(error)
            }
        }
    }

    /// Short digest of recent history text used as memory context for
    /// intent detection.
    fn memory_summary(&self) -> String {
        let mut summary = String::new();
        for message in self.state.history().iter().rev() {
            let text = message.text();
            if !text.is_empty() {
                if !summary.is_empty() {
                    summary.insert(0, ' ');
                }
                summary.insert_str(0, &text);
            }
            if summary.len() >= MEMORY_SUMMARY_CHARS {
                break;
            }
        }
        summary.chars().take(MEMORY_SUMMARY_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_is_copy_eq() {
        let mode = EngineMode::Chat;
        assert_eq!(mode, EngineMode::Chat);
        assert_ne!(mode, EngineMode::Generate);
    }
}
