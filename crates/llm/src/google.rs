//! Google Gemini Provider
//!
//! Adapter for the Gemini `generateContent` protocol: `contents` with
//! `user`/`model` roles, camelCase part keys, and function calls that
//! carry no correlation id on the wire. Ids are synthesized at parse time
//! so the rest of the engine can rely on them.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use codeloom_core::message::{synthesize_call_id, FunctionDeclaration, Message, Part, Role};

use crate::framing::{retain_last, split_documents};
use crate::http_client::build_http_client;
use crate::provider::{post_for_body, LlmProvider};
use crate::types::{
    FinishSignal, LlmError, LlmResult, ProviderConfig, ProviderResponse, RequestOptions, ToolCall,
};

/// Default Gemini API base
const GOOGLE_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Google Gemini provider
pub struct GoogleProvider {
    config: ProviderConfig,
}

impl GoogleProvider {
    /// Create a new adapter with the given configuration
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    /// Get the API endpoint URL
    fn endpoint(&self) -> String {
        match &self.config.base_url {
            Some(url) => url.clone(),
            None => format!("{}/{}:generateContent", GOOGLE_API_BASE, self.config.model),
        }
    }

    /// Convert one core message into a Gemini `content` object.
    fn message_to_wire(&self, message: &Message) -> Value {
        let role = match message.role {
            Role::User => "user",
            Role::Model => "model",
        };

        let parts: Vec<Value> = message
            .parts
            .iter()
            .map(|part| match part {
                Part::Text { text } => serde_json::json!({"text": text}),
                Part::FunctionCall { name, args, .. } => serde_json::json!({
                    "functionCall": {"name": name, "args": args}
                }),
                Part::FunctionResponse { name, response, .. } => serde_json::json!({
                    "functionResponse": {"name": name, "response": response}
                }),
            })
            .collect();

        serde_json::json!({"role": role, "parts": parts})
    }

    fn map_finish(reason: &str) -> Option<FinishSignal> {
        match reason {
            "STOP" => Some(FinishSignal::Stop),
            "MAX_TOKENS" => Some(FinishSignal::MaxTokens),
            "SAFETY" => Some(FinishSignal::Safety),
            "MALFORMED_FUNCTION_CALL" => Some(FinishSignal::MalformedFunctionCall),
            _ => Some(FinishSignal::Stop),
        }
    }
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
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
        let contents: Vec<Value> = history.iter().map(|m| self.message_to_wire(m)).collect();

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": self.config.max_tokens,
                "temperature": options
                    .temperature_override
                    .unwrap_or(self.config.temperature),
            }
        });

        if let Some(sys) = system {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{"text": sys}]
            });
        }

        if !tools.is_empty() {
            let declarations: Vec<Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters
                    })
                })
                .collect();
            body["tools"] = serde_json::json!([{"functionDeclarations": declarations}]);
        }

        body
    }

    fn parse_body(&self, body: &str) -> LlmResult<ProviderResponse> {
        let documents = split_documents(body)?;

        let mut text = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut finish: Option<FinishSignal> = None;

        for doc in &documents {
            let event: WireEvent = serde_json::from_value(doc.clone())
                .map_err(|e| LlmError::parse(e.to_string()))?;

            for candidate in &event.candidates {
                if let Some(content) = &candidate.content {
                    for part in &content.parts {
                        if let Some(chunk) = &part.text {
                            text.push_str(chunk);
                        }
                        if let Some(call) = &part.function_call {
                            tool_calls.push(ToolCall {
                                id: synthesize_call_id(&call.name),
                                name: call.name.clone(),
                                args: call.args.clone().unwrap_or(Value::Null),
                            });
                        }
                    }
                }
                retain_last(
                    &mut finish,
                    candidate
                        .finish_reason
                        .as_deref()
                        .and_then(Self::map_finish),
                );
            }
        }

        // Gemini reports STOP even when function calls are pending; the
        // pending calls are what decides that the turn continues.
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
        api_key: &str,
        options: &RequestOptions,
    ) -> LlmResult<ProviderResponse> {
        let body = self.build_request_body(history, system, tools, options);
        let client = build_http_client(options.timeout_secs);
        let request = client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key);
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
    candidates: Vec<WireCandidate>,
}

#[derive(Debug, Deserialize)]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default, rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Deserialize)]
struct WirePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "functionCall")]
    function_call: Option<WireFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    args: Option<Value>,
}
