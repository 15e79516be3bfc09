//! Ollama Provider
//!
//! Adapter for the local Ollama `/api/chat` protocol: flat messages with
//! a single `content` string, NDJSON response objects with a `done` flag,
//! and tool calls whose arguments are already JSON objects but carry no
//! id. No authentication header is sent; the api_key argument is ignored.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use codeloom_core::message::{synthesize_call_id, FunctionDeclaration, Message, Part, Role};

use crate::framing::split_documents;
use crate::http_client::build_http_client;
use crate::provider::{post_for_body, LlmProvider};
use crate::types::{
    FinishSignal, LlmError, LlmResult, ProviderConfig, ProviderResponse, RequestOptions, ToolCall,
};

/// Default local Ollama endpoint
const OLLAMA_DEFAULT_BASE: &str = "http://localhost:11434";

/// Ollama provider
pub struct OllamaProvider {
    config: ProviderConfig,
}

impl OllamaProvider {
    /// Create a new adapter with the given configuration
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    /// Get the API endpoint URL
    fn endpoint(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(OLLAMA_DEFAULT_BASE);
        format!("{}/api/chat", base.trim_end_matches('/'))
    }

    /// Convert one core message to Ollama wire messages.
    ///
    /// Ollama has no multi-part content; text parts are joined and
    /// function responses become separate `tool` role messages.
    fn message_to_wire(&self, message: &Message) -> Vec<Value> {
        let role = match message.role {
            Role::User => "user",
            Role::Model => "assistant",
        };

        let mut wire = Vec::new();
        let mut text_parts: Vec<&str> = Vec::new();
        let mut tool_calls: Vec<Value> = Vec::new();

        for part in &message.parts {
            match part {
                Part::Text { text } => text_parts.push(text),
                Part::FunctionCall { name, args, .. } => {
                    tool_calls.push(serde_json::json!({
                        "function": {"name": name, "arguments": args}
                    }));
                }
                Part::FunctionResponse { response, .. } => {
                    wire.push(serde_json::json!({
                        "role": "tool",
                        "content": response.to_string()
                    }));
                }
            }
        }

        if !text_parts.is_empty() || !tool_calls.is_empty() {
            let mut msg = serde_json::json!({
                "role": role,
                "content": text_parts.join("\n"),
            });
            if !tool_calls.is_empty() {
                msg["tool_calls"] = serde_json::json!(tool_calls);
            }
            wire.insert(0, msg);
        }

        wire
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn build_request_body(
        &self,
        history: &[Message],
        system: Option<&str>,
        tools: &[FunctionDeclaration],
        options: &RequestOptions,
    ) -> Value {
        let mut messages: Vec<Value> = Vec::new();
        if let Some(sys) = system {
            messages.push(serde_json::json!({"role": "system", "content": sys}));
        }
        for msg in history {
            messages.extend(self.message_to_wire(msg));
        }

        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "stream": false,
            "options": {
                "num_predict": self.config.max_tokens,
                "temperature": options
                    .temperature_override
                    .unwrap_or(self.config.temperature),
            }
        });

        if !tools.is_empty() {
            let wire_tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters
                        }
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(wire_tools);
        }

        body
    }

    fn parse_body(&self, body: &str) -> LlmResult<ProviderResponse> {
        let documents = split_documents(body)?;

        let mut text = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut finish: Option<FinishSignal> = None;
        let last = documents.len().saturating_sub(1);

        for (index, doc) in documents.iter().enumerate() {
            let event: WireEvent = serde_json::from_value(doc.clone())
                .map_err(|e| LlmError::parse(e.to_string()))?;

            if let Some(message) = &event.message {
                if let Some(content) = &message.content {
                    text.push_str(content);
                }
                for call in message.tool_calls.iter().flatten() {
                    tool_calls.push(ToolCall {
                        id: synthesize_call_id(&call.function.name),
                        name: call.function.name.clone(),
                        args: call.function.arguments.clone().unwrap_or(Value::Null),
                    });
                }
            }

            // done:true only counts on the final object of the stream
            if index == last && event.done {
                finish = Some(match event.done_reason.as_deref() {
                    Some("length") => FinishSignal::MaxTokens,
                    _ => FinishSignal::Stop,
                });
            }
        }

        if !tool_calls.is_empty() && finish == Some(FinishSignal::Stop) {
            finish = None;
        }

        Ok(ProviderResponse {
            text: if text.is_empty() { None } else { Some(text) },
            tool_calls,
            finish,
        }
        .normalized())
    }

    async fn generate(
        &self,
        history: &[Message],
        system: Option<&str>,
        tools: &[FunctionDeclaration],
        _api_key: &str,
        options: &RequestOptions,
    ) -> LlmResult<ProviderResponse> {
        let body = self.build_request_body(history, system, tools, options);
        let client = build_http_client(options.timeout_secs);
        let request = client.post(self.endpoint());
        let body_text = post_for_body(request, &body, self.name()).await?;
        self.parse_body(&body_text)
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}
