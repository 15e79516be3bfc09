//! OpenAI-Style Provider
//!
//! Adapter for OpenAI-compatible chat-completions endpoints: `messages`
//! with assistant `tool_calls` and `tool` role results. Handles both the
//! single-document response shape (`choices[].message`) and the streamed
//! chunk shape (`choices[].delta`) through the shared framing layer.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use codeloom_core::message::{synthesize_call_id, FunctionDeclaration, Message, Part, Role};

use crate::framing::{retain_last, split_documents};
use crate::http_client::build_http_client;
use crate::provider::{post_for_body, LlmProvider};
use crate::types::{
    FinishSignal, LlmResult, ProviderConfig, ProviderResponse, RequestOptions, ToolCall,
};

/// Default OpenAI API endpoint
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-style provider
pub struct OpenAiProvider {
    config: ProviderConfig,
}

impl OpenAiProvider {
    /// Create a new adapter with the given configuration
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    /// Get the API endpoint URL
    fn endpoint(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(OPENAI_API_URL)
    }

    /// Convert one core message to OpenAI wire messages.
    ///
    /// Function responses become separate `tool` role messages; a model
    /// message carrying calls becomes one assistant message with a
    /// `tool_calls` array.
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
                Part::FunctionCall { name, args, id } => {
                    tool_calls.push(serde_json::json!({
                        "id": id,
                        "type": "function",
                        "function": {
                            "name": name,
                            "arguments": args.to_string()
                        }
                    }));
                }
                Part::FunctionResponse { response, id, .. } => {
                    wire.push(serde_json::json!({
                        "role": "tool",
                        "tool_call_id": id,
                        "content": response.to_string()
                    }));
                }
            }
        }

        if !tool_calls.is_empty() {
            let text = text_parts.join("\n");
            let mut msg = serde_json::json!({
                "role": role,
                "tool_calls": tool_calls,
            });
            // Some OpenAI-compatible APIs require the content field even
            // when the assistant only emits tool calls.
            if text.is_empty() {
                msg["content"] = Value::Null;
            } else {
                msg["content"] = serde_json::json!(text);
            }
            wire.insert(0, msg);
        } else if !text_parts.is_empty() {
            wire.insert(
                0,
                serde_json::json!({
                    "role": role,
                    "content": text_parts.join("\n")
                }),
            );
        }

        wire
    }

    fn tool_to_wire(&self, tool: &FunctionDeclaration) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters
            }
        })
    }

    fn map_finish(reason: &str) -> Option<FinishSignal> {
        match reason {
            "stop" => Some(FinishSignal::Stop),
            "length" => Some(FinishSignal::MaxTokens),
            "content_filter" => Some(FinishSignal::Safety),
            // Tool calls pending - the turn continues
            "tool_calls" | "function_call" => None,
            _ => Some(FinishSignal::Stop),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
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
            messages.push(serde_json::json!({
                "role": "system",
                "content": sys
            }));
        }
        for msg in history {
            messages.extend(self.message_to_wire(msg));
        }

        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": options
                .temperature_override
                .unwrap_or(self.config.temperature),
            "messages": messages,
        });

        if !tools.is_empty() {
            let wire_tools: Vec<Value> = tools.iter().map(|t| self.tool_to_wire(t)).collect();
            body["tools"] = serde_json::json!(wire_tools);
        }

        body
    }

    fn parse_body(&self, body: &str) -> LlmResult<ProviderResponse> {
        let documents = split_documents(body)?;

        let mut text = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut finish: Option<FinishSignal> = None;
        let mut malformed = false;
        // Streamed tool calls arrive as argument fragments keyed by index.
        let mut partial_calls: BTreeMap<usize, (Option<String>, String, String)> = BTreeMap::new();

        for doc in &documents {
            let event: WireEvent = serde_json::from_value(doc.clone())
                .map_err(|e| crate::types::LlmError::parse(e.to_string()))?;

            for choice in &event.choices {
                if let Some(message) = &choice.message {
                    if let Some(content) = &message.content {
                        text.push_str(content);
                    }
                    for call in message.tool_calls.iter().flatten() {
                        match serde_json::from_str::<Value>(&call.function.arguments) {
                            Ok(args) => tool_calls.push(ToolCall {
                                id: call
                                    .id
                                    .clone()
                                    .unwrap_or_else(|| synthesize_call_id(&call.function.name)),
                                name: call.function.name.clone(),
                                args,
                            }),
                            Err(_) => malformed = true,
                        }
                    }
                }

                if let Some(delta) = &choice.delta {
                    if let Some(content) = &delta.content {
                        text.push_str(content);
                    }
                    for call in delta.tool_calls.iter().flatten() {
                        let entry = partial_calls.entry(call.index).or_insert_with(|| {
                            (None, String::new(), String::new())
                        });
                        if let Some(id) = &call.id {
                            entry.0 = Some(id.clone());
                        }
                        if let Some(function) = &call.function {
                            if let Some(name) = &function.name {
                                entry.1.push_str(name);
                            }
                            if let Some(arguments) = &function.arguments {
                                entry.2.push_str(arguments);
                            }
                        }
                    }
                }

                retain_last(
                    &mut finish,
                    choice
                        .finish_reason
                        .as_deref()
                        .and_then(Self::map_finish),
                );
            }
        }

        // Finalize accumulated streamed calls in index order
        for (_, (id, name, arguments)) in partial_calls {
            if name.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(&arguments) {
                Ok(args) => tool_calls.push(ToolCall {
                    id: id.unwrap_or_else(|| synthesize_call_id(&name)),
                    name,
                    args,
                }),
                Err(_) => malformed = true,
            }
        }

        if malformed && tool_calls.is_empty() {
            finish = Some(FinishSignal::MalformedFunctionCall);
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
        api_key: &str,
        options: &RequestOptions,
    ) -> LlmResult<ProviderResponse> {
        let body = self.build_request_body(history, system, tools, options);
        let client = build_http_client(options.timeout_secs);
        let request = client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", api_key));
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
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    delta: Option<WireDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
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
    #[serde(default)]
    id: Option<String>,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireDeltaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireDeltaToolCall {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireDeltaFunction>,
}

#[derive(Debug, Deserialize)]
struct WireDeltaFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}
