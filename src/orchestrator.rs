//! Turn Controller
//!
//! The bounded conversation state machine: sends a request built from the
//! current history, interprets the normalized response, executes any
//! requested tools, appends results to history, and decides whether to
//! continue, stop, or fail. Also home to [`ModelClient`], the
//! key-rotating request primitive the generation pipeline reuses.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use codeloom_core::events::ProgressEvent;
use codeloom_core::message::{FunctionDeclaration, Message, Part, Role};
use codeloom_llm::credentials::{call_with_retry, KeySource};
use codeloom_llm::provider::LlmProvider;
use codeloom_llm::types::{LlmError, LlmResult, ProviderResponse, RequestOptions};
use codeloom_tools::bridge::ToolBridge;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{EngineError, EngineResult};

/// Attempts per logical model call (rotation + backoff inside)
const MAX_CALL_ATTEMPTS: u32 = 3;

// ============================================================================
// Model client
// ============================================================================

/// One provider plus one credential source. Every model call in the
/// engine, whether from the turn loop or a pipeline phase, goes through
/// here so key rotation and backoff behave identically everywhere.
#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn LlmProvider>,
    keys: Arc<dyn KeySource>,
    interactive_timeout_secs: u64,
    generation_timeout_secs: u64,
}

impl ModelClient {
    pub fn new(provider: Arc<dyn LlmProvider>, keys: Arc<dyn KeySource>) -> Self {
        Self {
            provider,
            keys,
            interactive_timeout_secs: RequestOptions::interactive().timeout_secs,
            generation_timeout_secs: RequestOptions::generation().timeout_secs,
        }
    }

    /// Replace the per-call timeout classes with configured values.
    pub fn with_timeouts(mut self, interactive_secs: u64, generation_secs: u64) -> Self {
        self.interactive_timeout_secs = interactive_secs;
        self.generation_timeout_secs = generation_secs;
        self
    }

    /// Options for short interactive turn-loop calls.
    pub fn interactive_options(&self) -> RequestOptions {
        RequestOptions::interactive().with_timeout_secs(self.interactive_timeout_secs)
    }

    /// Options for long generation-phase calls.
    pub fn generation_options(&self) -> RequestOptions {
        RequestOptions::generation().with_timeout_secs(self.generation_timeout_secs)
    }

    /// The model the credential source currently targets.
    pub fn model(&self) -> String {
        self.keys.current_model()
    }

    /// Issue one logical request with retry and key rotation.
    pub async fn request(
        &self,
        history: &[Message],
        system: Option<&str>,
        tools: &[FunctionDeclaration],
        options: &RequestOptions,
    ) -> LlmResult<ProviderResponse> {
        call_with_retry(&*self.keys, MAX_CALL_ATTEMPTS, |key| {
            let provider = Arc::clone(&self.provider);
            async move {
                provider
                    .generate(history, system, tools, &key, options)
                    .await
            }
        })
        .await
    }

    /// Single-shot text request used by pipeline phases: one user prompt,
    /// no tools, generation timeout.
    pub async fn prompt(&self, prompt: &str, system: Option<&str>) -> LlmResult<String> {
        let history = vec![Message::user(prompt)];
        let response = self
            .request(&history, system, &[], &self.generation_options())
            .await?;
        response
            .text
            .filter(|t| !t.is_empty())
            .ok_or_else(|| LlmError::parse("model returned no text"))
    }
}

// ============================================================================
// Conversation state
// ============================================================================

/// Ordered message history plus a strictly-increasing turn counter.
/// Owned by exactly one orchestrator; cleared only by explicit reset.
#[derive(Default)]
pub struct ConversationState {
    history: Vec<Message>,
    turn: u32,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Immutable snapshot of the history.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn push(&mut self, message: Message) {
        self.history.push(message);
    }

    fn begin_turn(&mut self) -> u32 {
        self.turn += 1;
        self.turn
    }

    /// Drop all history and reset the counter.
    pub fn reset(&mut self) {
        self.history.clear();
        self.turn = 0;
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives the `AwaitingResponse -> ExecutingTools -> ...` loop for one
/// request. Emits exactly one terminal event (`Done`, `Error`, or
/// `KeysExhausted`) per run.
pub struct Orchestrator {
    client: ModelClient,
    bridge: Arc<ToolBridge>,
    events: UnboundedSender<ProgressEvent>,
    system_prompt: Option<String>,
    max_turns: u32,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        client: ModelClient,
        bridge: Arc<ToolBridge>,
        events: UnboundedSender<ProgressEvent>,
    ) -> Self {
        Self {
            client,
            bridge,
            events,
            system_prompt: None,
            max_turns: codeloom_core::config::EngineConfig::default().max_turns,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn emit(&self, event: ProgressEvent) {
        let _ = self.events.send(event);
    }

    fn fail(&self, error: EngineError) -> EngineError {
        if error.is_keys_exhausted() {
            self.emit(ProgressEvent::KeysExhausted);
        } else {
            self.emit(ProgressEvent::Error {
                message: error.to_string(),
            });
        }
        error
    }

    /// Run the turn loop until a terminal state. `user_message`, when
    /// present, is appended before the first request; `None` continues
    /// from the existing history.
    pub async fn run(
        &self,
        state: &mut ConversationState,
        user_message: Option<&str>,
    ) -> EngineResult<()> {
        if let Some(text) = user_message {
            state.push(Message::user(text));
        }
        let declarations = self.bridge.registry().function_declarations();

        loop {
            if self.cancel.is_cancelled() {
                return Err(self.fail(EngineError::Cancelled));
            }
            if state.turn() >= self.max_turns {
                return Err(self.fail(EngineError::MaxTurnsReached(self.max_turns)));
            }
            let turn = state.begin_turn();
            debug!(turn, "requesting model response");

            let response = match self
                .client
                .request(
                    state.history(),
                    self.system_prompt.as_deref(),
                    &declarations,
                    &self.client.interactive_options(),
                )
                .await
            {
                Ok(response) => response,
                Err(error) => return Err(self.fail(error.into())),
            };

            // First pass: collect text and calls in document order.
            let had_text = response.text.as_deref().is_some_and(|t| !t.is_empty());
            let mut model_message = Message::empty(Role::Model);
            if let Some(text) = response.text {
                if !text.is_empty() {
                    self.emit(ProgressEvent::TextChunk {
                        content: text.clone(),
                    });
                    model_message.push(Part::text(text));
                }
            }
            for call in &response.tool_calls {
                model_message.push(Part::function_call(
                    &call.name,
                    call.args.clone(),
                    &call.id,
                ));
            }
            if !model_message.parts.is_empty() {
                state.push(model_message);
            }

            // Second pass: execute sequentially, each result appended to
            // history before the next request is built.
            if !response.tool_calls.is_empty() {
                let mut responses = Message::empty(Role::User);
                for call in &response.tool_calls {
                    self.emit(ProgressEvent::ToolCallStarted {
                        call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        arguments: call.args.to_string(),
                    });
                    let result = self
                        .bridge
                        .execute(&call.name, call.args.clone(), &self.cancel)
                        .await;
                    self.emit(ProgressEvent::ToolResult {
                        call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        display: Some(result.return_display.clone()),
                        error: result.error.as_ref().map(|e| e.message.clone()),
                    });
                    responses.push(Part::function_response(
                        &call.name,
                        result.response_value(),
                        &call.id,
                    ));
                }
                state.push(responses);
                continue;
            }

            return match response.finish {
                Some(signal) => {
                    debug!(%signal, turn, "turn loop finished");
                    self.emit(ProgressEvent::Done);
                    Ok(())
                }
                // Adapters synthesize Stop for text-only documents, so a
                // missing signal here means an empty response.
                None if had_text => {
                    self.emit(ProgressEvent::Done);
                    Ok(())
                }
                None => {
                    warn!(turn, "provider returned no text, no calls, no finish signal");
                    Err(self.fail(EngineError::ProtocolViolation(
                        "response carried no text, no tool calls, and no finish signal"
                            .to_string(),
                    )))
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use codeloom_core::tool_trait::{Tool, ToolOutput, ToolRegistry};
    use codeloom_llm::types::{FinishSignal, ProviderConfig, ProviderKind, ToolCall};
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    /// Provider that replays scripted responses and records the history
    /// length it saw on each call.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<LlmResult<ProviderResponse>>>,
        seen_history_lens: Mutex<Vec<usize>>,
        seen_timeouts: Mutex<Vec<u64>>,
        config: ProviderConfig,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<LlmResult<ProviderResponse>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                seen_history_lens: Mutex::new(Vec::new()),
                seen_timeouts: Mutex::new(Vec::new()),
                config: ProviderConfig::new(ProviderKind::OpenAi, "scripted"),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }
        fn model(&self) -> &str {
            "scripted"
        }
        fn build_request_body(
            &self,
            _history: &[Message],
            _system: Option<&str>,
            _tools: &[FunctionDeclaration],
            _options: &RequestOptions,
        ) -> Value {
            Value::Null
        }
        fn parse_body(&self, _body: &str) -> LlmResult<ProviderResponse> {
            unimplemented!("scripted provider never parses")
        }
        async fn generate(
            &self,
            history: &[Message],
            _system: Option<&str>,
            _tools: &[FunctionDeclaration],
            _api_key: &str,
            options: &RequestOptions,
        ) -> LlmResult<ProviderResponse> {
            self.seen_history_lens.lock().unwrap().push(history.len());
            self.seen_timeouts.lock().unwrap().push(options.timeout_secs);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::parse("script exhausted")))
        }
        fn config(&self) -> &ProviderConfig {
            &self.config
        }
    }

    struct StaticKeys;

    impl KeySource for StaticKeys {
        fn next_api_key(&self) -> Option<String> {
            Some("test-key".to_string())
        }
        fn current_model(&self) -> String {
            "scripted".to_string()
        }
    }

    struct EmptyKeys;

    impl KeySource for EmptyKeys {
        fn next_api_key(&self) -> Option<String> {
            None
        }
        fn current_model(&self) -> String {
            "scripted".to_string()
        }
    }

    struct ShoutTool;

    #[async_trait]
    impl Tool for ShoutTool {
        fn name(&self) -> &str {
            "shout"
        }
        fn description(&self) -> &str {
            "Uppercases text"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, args: Value) -> codeloom_core::error::CoreResult<ToolOutput> {
            let text = args["text"].as_str().unwrap_or("");
            Ok(ToolOutput::uniform(text.to_uppercase()))
        }
    }

    fn text_response(text: &str, finish: Option<FinishSignal>) -> LlmResult<ProviderResponse> {
        Ok(ProviderResponse {
            text: Some(text.to_string()),
            tool_calls: vec![],
            finish,
        })
    }

    fn tool_response(name: &str, id: &str) -> LlmResult<ProviderResponse> {
        Ok(ProviderResponse {
            text: None,
            tool_calls: vec![ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                args: serde_json::json!({"text": "hi"}),
            }],
            finish: None,
        })
    }

    fn harness(
        provider: ScriptedProvider,
        keys: Arc<dyn KeySource>,
    ) -> (Orchestrator, UnboundedReceiver<ProgressEvent>, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let client = ModelClient::new(provider.clone(), keys);
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ShoutTool));
        let bridge = Arc::new(ToolBridge::new(Arc::new(registry)));
        let (tx, rx) = unbounded_channel();
        (Orchestrator::new(client, bridge, tx), rx, provider)
    }

    fn drain(rx: &mut UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_text_only_turn_emits_done() {
        let (orch, mut rx, _) = harness(
            ScriptedProvider::new(vec![text_response("hello", Some(FinishSignal::Stop))]),
            Arc::new(StaticKeys),
        );
        let mut state = ConversationState::new();
        orch.run(&mut state, Some("hi")).await.unwrap();

        let events = drain(&mut rx);
        assert!(matches!(events[0], ProgressEvent::TextChunk { .. }));
        assert!(matches!(events.last().unwrap(), ProgressEvent::Done));
        assert_eq!(state.turn(), 1);
        // user + model messages
        assert_eq!(state.history().len(), 2);
    }

    #[tokio::test]
    async fn test_tool_call_loops_and_appends_before_next_request() {
        let (orch, mut rx, provider) = harness(
            ScriptedProvider::new(vec![
                tool_response("shout", "call-1"),
                text_response("done", Some(FinishSignal::Stop)),
            ]),
            Arc::new(StaticKeys),
        );
        let mut state = ConversationState::new();
        orch.run(&mut state, Some("shout hi")).await.unwrap();

        // Second request must have seen the function response appended.
        let lens = provider.seen_history_lens.lock().unwrap().clone();
        assert_eq!(lens, vec![1, 3]);

        let events = drain(&mut rx);
        let started = events
            .iter()
            .position(|e| matches!(e, ProgressEvent::ToolCallStarted { .. }))
            .unwrap();
        let finished = events
            .iter()
            .position(|e| matches!(e, ProgressEvent::ToolResult { .. }))
            .unwrap();
        assert!(started < finished);
        assert_eq!(state.turn(), 2);
    }

    #[tokio::test]
    async fn test_missing_finish_with_text_is_done_not_failed() {
        let (orch, mut rx, _) = harness(
            ScriptedProvider::new(vec![text_response("answer", None)]),
            Arc::new(StaticKeys),
        );
        let mut state = ConversationState::new();
        orch.run(&mut state, Some("q")).await.unwrap();
        assert!(matches!(
            drain(&mut rx).last().unwrap(),
            ProgressEvent::Done
        ));
    }

    #[tokio::test]
    async fn test_empty_response_is_protocol_violation() {
        let (orch, mut rx, _) = harness(
            ScriptedProvider::new(vec![Ok(ProviderResponse::default())]),
            Arc::new(StaticKeys),
        );
        let mut state = ConversationState::new();
        let err = orch.run(&mut state, Some("q")).await.unwrap_err();
        assert!(matches!(err, EngineError::ProtocolViolation(_)));
        assert!(matches!(
            drain(&mut rx).last().unwrap(),
            ProgressEvent::Error { .. }
        ));
    }

    #[tokio::test]
    async fn test_turn_ceiling_fails_explicitly() {
        // Provider always requests another tool call.
        let responses: Vec<_> = (0..10).map(|i| tool_response("shout", &format!("c{}", i))).collect();
        let (orch, mut rx, _) = harness(ScriptedProvider::new(responses), Arc::new(StaticKeys));
        let orch = orch.with_max_turns(3);
        let mut state = ConversationState::new();
        let err = orch.run(&mut state, Some("loop")).await.unwrap_err();
        assert!(matches!(err, EngineError::MaxTurnsReached(3)));
        assert_eq!(state.turn(), 3);
        let events = drain(&mut rx);
        let terminals = events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    ProgressEvent::Done | ProgressEvent::Error { .. } | ProgressEvent::KeysExhausted
                )
            })
            .count();
        assert_eq!(terminals, 1);
    }

    #[tokio::test]
    async fn test_keys_exhausted_emits_distinct_event() {
        let (orch, mut rx, _) = harness(
            ScriptedProvider::new(vec![text_response("never", Some(FinishSignal::Stop))]),
            Arc::new(EmptyKeys),
        );
        let mut state = ConversationState::new();
        let err = orch.run(&mut state, Some("q")).await.unwrap_err();
        assert!(err.is_keys_exhausted());
        assert!(matches!(
            drain(&mut rx).last().unwrap(),
            ProgressEvent::KeysExhausted
        ));
    }

    #[tokio::test]
    async fn test_configured_timeouts_reach_request_options() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("turn", Some(FinishSignal::Stop)),
            text_response("phase", Some(FinishSignal::Stop)),
        ]));
        let client =
            ModelClient::new(provider.clone(), Arc::new(StaticKeys)).with_timeouts(7, 9);

        client
            .request(
                &[Message::user("hi")],
                None,
                &[],
                &client.interactive_options(),
            )
            .await
            .unwrap();
        client.prompt("plan", None).await.unwrap();

        let timeouts = provider.seen_timeouts.lock().unwrap().clone();
        assert_eq!(timeouts, vec![7, 9]);
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let mut state = ConversationState::new();
        state.push(Message::user("hello"));
        state.begin_turn();
        state.reset();
        assert!(state.history().is_empty());
        assert_eq!(state.turn(), 0);
    }
}
