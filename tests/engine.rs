//! End-to-end engine tests over a scripted provider and shell.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use codeloom::core::config::EngineConfig;
use codeloom::core::error::CoreResult;
use codeloom::core::events::ProgressEvent;
use codeloom::core::message::{FunctionDeclaration, Message};
use codeloom::core::tool_trait::{Tool, ToolOutput, ToolRegistry};
use codeloom::llm::credentials::KeySource;
use codeloom::llm::provider::LlmProvider;
use codeloom::llm::types::{
    FinishSignal, LlmError, LlmResult, ProviderConfig, ProviderKind, ProviderResponse,
    RequestOptions, ToolCall,
};
use codeloom::tools::shell::{ShellExecutor, ShellOutput};
use codeloom::{Engine, EngineMode};

// ============================================================================
// Scripted collaborators
// ============================================================================

struct ScriptedProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    config: ProviderConfig,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            config: ProviderConfig::new(ProviderKind::OpenAi, "scripted"),
        })
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
        unimplemented!()
    }
    async fn generate(
        &self,
        _history: &[Message],
        _system: Option<&str>,
        _tools: &[FunctionDeclaration],
        _api_key: &str,
        _options: &RequestOptions,
    ) -> LlmResult<ProviderResponse> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::parse("script exhausted"))
    }
    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

struct StaticKeys;

impl KeySource for StaticKeys {
    fn next_api_key(&self) -> Option<String> {
        Some("key".to_string())
    }
    fn current_model(&self) -> String {
        "scripted".to_string()
    }
}

/// Shell that approves everything and records every command.
struct YesShell {
    calls: Mutex<Vec<String>>,
}

impl YesShell {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ShellExecutor for YesShell {
    async fn run(&self, command: &str, _cwd: &Path) -> ShellOutput {
        self.calls.lock().unwrap().push(command.to_string());
        ShellOutput::ok("ok")
    }
}

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Echoes input"
    }
    fn parameters_schema(&self) -> Value {
        serde_json::json!({"type": "object"})
    }
    async fn execute(&self, args: Value) -> CoreResult<ToolOutput> {
        Ok(ToolOutput::uniform(
            args["text"].as_str().unwrap_or("").to_string(),
        ))
    }
}

fn text(content: &str) -> ProviderResponse {
    ProviderResponse {
        text: Some(content.to_string()),
        tool_calls: vec![],
        finish: Some(FinishSignal::Stop),
    }
}

// ============================================================================
// Chat mode
// ============================================================================

#[tokio::test]
async fn chat_turn_with_tool_call_reaches_done() {
    let provider = ScriptedProvider::new(vec![
        ProviderResponse {
            text: Some("Let me echo that.".to_string()),
            tool_calls: vec![ToolCall {
                id: "c1".to_string(),
                name: "echo".to_string(),
                args: serde_json::json!({"text": "hi"}),
            }],
            finish: None,
        },
        text("It said: hi"),
    ]);

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool));

    let (engine, mut rx) = Engine::new(provider, Arc::new(StaticKeys), EngineConfig::default());
    let mut engine = engine.with_registry(Arc::new(registry));

    engine.handle_message("say hi", EngineMode::Chat).await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    let started = events
        .iter()
        .position(|e| matches!(e, ProgressEvent::ToolCallStarted { .. }))
        .expect("tool call event");
    let result = events
        .iter()
        .position(|e| matches!(e, ProgressEvent::ToolResult { .. }))
        .expect("tool result event");
    assert!(started < result);
    assert!(matches!(events.last().unwrap(), ProgressEvent::Done));

    // user, model(call), user(response), model(final)
    assert_eq!(engine.history().len(), 4);
}

#[tokio::test]
async fn chat_empty_response_fails_with_single_error_event() {
    let provider = ScriptedProvider::new(vec![ProviderResponse::default()]);
    let (mut engine, mut rx) =
        Engine::new(provider, Arc::new(StaticKeys), EngineConfig::default());

    let result = engine.handle_message("hello", EngineMode::Chat).await;
    assert!(result.is_err());

    let mut terminals = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(
            event,
            ProgressEvent::Done | ProgressEvent::Error { .. } | ProgressEvent::KeysExhausted
        ) {
            terminals += 1;
        }
    }
    assert_eq!(terminals, 1);
}

// ============================================================================
// Generate mode
// ============================================================================

#[tokio::test]
async fn generate_flow_writes_files_and_completes() {
    let dir = tempfile::tempdir().unwrap();

    let provider = ScriptedProvider::new(vec![
        // file list
        text(r#"[{"file_path": "requirements.txt"}, {"file_path": "app.py"}]"#),
        // metadata
        text(
            r#"[
            {"file_path": "requirements.txt", "description": "deps", "exports": [], "imports": [], "relationships": []},
            {"file_path": "app.py", "description": "entry", "exports": ["app"], "imports": [], "relationships": ["requirements.txt"]}
        ]"#,
        ),
        // codegen: requirements.txt
        text("flask\n"),
        // codegen: app.py, fenced to verify stripping
        text("```python\nfrom flask import Flask\napp = Flask(__name__)\n```"),
        // command detection: nothing from the model, static kicks in
        text("[]"),
    ]);

    let shell = YesShell::new();
    let config = EngineConfig::default()
        .with_workspace_root(dir.path().to_string_lossy())
        .with_max_validation_attempts(2);

    let (engine, mut rx) = Engine::new(provider, Arc::new(StaticKeys), config);
    let mut engine = engine.with_shell(shell.clone());

    engine
        .handle_message("create a flask todo app", EngineMode::Generate)
        .await
        .unwrap();

    // Files written immediately, fences stripped.
    let app = std::fs::read_to_string(dir.path().join("app.py")).unwrap();
    assert!(app.starts_with("from flask import Flask"));
    assert!(!app.contains("```"));
    assert!(dir.path().join("requirements.txt").exists());

    // Static detection ran the Python project commands through the shell.
    let calls = shell.calls.lock().unwrap().clone();
    assert!(calls.iter().any(|c| c.contains("pip install")));
    assert!(calls.iter().any(|c| c == "python3 app.py"));

    let mut saw_todos = false;
    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, ProgressEvent::TodoUpdate { .. }) {
            saw_todos = true;
        }
        last = Some(event);
    }
    assert!(saw_todos);
    assert!(matches!(last.unwrap(), ProgressEvent::Done));
}

#[tokio::test]
async fn generate_unparseable_metadata_retries_within_parse_budget() {
    let dir = tempfile::tempdir().unwrap();

    let provider = ScriptedProvider::new(vec![
        // file list
        text(r#"[{"file_path": "requirements.txt"}, {"file_path": "app.py"}]"#),
        // metadata: bracket-free prose, unparseable
        text("I could not produce JSON this time."),
        // metadata retry (same prompt, fresh call): valid and count-matched
        text(
            r#"[
            {"file_path": "requirements.txt", "description": "deps"},
            {"file_path": "app.py", "description": "entry", "exports": ["app"]}
        ]"#,
        ),
        // codegen
        text("flask\n"),
        text("from flask import Flask\napp = Flask(__name__)\n"),
        // command detection
        text("[]"),
    ]);

    let config = EngineConfig::default()
        .with_workspace_root(dir.path().to_string_lossy())
        .with_max_validation_attempts(2);
    let (engine, mut rx) = Engine::new(provider, Arc::new(StaticKeys), config);
    let mut engine = engine.with_shell(YesShell::new());

    engine
        .handle_message("create a flask todo app", EngineMode::Generate)
        .await
        .unwrap();

    assert!(dir.path().join("app.py").exists());
    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        last = Some(event);
    }
    assert!(matches!(last.unwrap(), ProgressEvent::Done));
}

#[tokio::test]
async fn generate_metadata_mismatch_retries_once_then_fails() {
    let dir = tempfile::tempdir().unwrap();

    let provider = ScriptedProvider::new(vec![
        // file list with two files
        text(r#"[{"file_path": "a.py"}, {"file_path": "b.py"}]"#),
        // metadata: one entry, mismatch
        text(r#"[{"file_path": "a.py"}]"#),
        // retry: still one entry
        text(r#"[{"file_path": "a.py"}]"#),
    ]);

    let config = EngineConfig::default().with_workspace_root(dir.path().to_string_lossy());
    let (engine, mut rx) = Engine::new(provider, Arc::new(StaticKeys), config);
    let mut engine = engine.with_shell(YesShell::new());

    let result = engine
        .handle_message("create a python tool", EngineMode::Generate)
        .await;
    assert!(result.is_err());

    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        last = Some(event);
    }
    assert!(matches!(last.unwrap(), ProgressEvent::Error { .. }));
}
