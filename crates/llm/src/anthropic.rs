//! Anthropic Messages Provider
//!
//! Adapter for the Anthropic Messages protocol: `user`/`assistant` roles
//! with typed content blocks (`text`, `tool_use`, `tool_result`) and a
//! top-level `system` field. The response is either a single message
//! document or an SSE event stream; the stream is folded statefully
//! because `tool_use` inputs arrive as JSON string fragments.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use codeloom_core::message::{FunctionDeclaration, Message, Part, Role};

use crate::framing::{retain_last, split_documents};
use crate::http_client::build_http_client;
use crate::provider::{post_for_body, LlmProvider};
use crate::types::{
    FinishSignal, LlmError, LlmResult, ProviderConfig, ProviderResponse, RequestOptions, ToolCall,
};

/// Default Anthropic API endpoint
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
/// API version header required by the Messages protocol
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages provider
pub struct AnthropicProvider {
    config: ProviderConfig,
}

impl AnthropicProvider {
    /// Create a new adapter with the given configuration
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    /// Get the API endpoint URL
    fn endpoint(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(ANTHROPIC_API_URL)
    }

    /// Convert one core message into Messages-protocol content blocks.
    fn message_to_wire(&self, message: &Message) -> Value {
        let role = match message.role {
            Role::User => "user",
            Role::Model => "assistant",
        };

        let content: Vec<Value> = message
            .parts
            .iter()
            .map(|part| match part {
                Part::Text { text } => serde_json::json!({"type": "text", "text": text}),
                Part::FunctionCall { name, args, id } => serde_json::json!({
                    "type": "tool_use",
                    "id": id,
                    "name": name,
                    "input": args
                }),
                Part::FunctionResponse { response, id, .. } => serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": id,
                    "content": response.to_string()
                }),
            })
            .collect();

        serde_json::json!({"role": role, "content": content})
    }

    fn map_finish(reason: &str) -> Option<FinishSignal> {
        match reason {
            "end_turn" | "stop_sequence" => Some(FinishSignal::Stop),
            "max_tokens" => Some(FinishSignal::MaxTokens),
            "refusal" => Some(FinishSignal::Safety),
            // Tool use pending - the turn continues
            "tool_use" => None,
            _ => Some(FinishSignal::Stop),
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
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
        let messages: Vec<Value> = history.iter().map(|m| self.message_to_wire(m)).collect();

        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": options
                .temperature_override
                .unwrap_or(self.config.temperature),
            "messages": messages,
        });

        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }

        if !tools.is_empty() {
            let wire_tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(wire_tools);
        }

        body
    }

    fn parse_body(&self, body: &str) -> LlmResult<ProviderResponse> {
        let documents = split_documents(body)?;

        let mut fold = StreamFold::default();
        for doc in &documents {
            fold.apply(doc)?;
        }
        Ok(fold.finish())
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
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        let body_text = post_for_body(request, &body, self.name()).await?;
        self.parse_body(&body_text)
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

// ============================================================================
// Stream fold
// ============================================================================

/// Accumulates Messages events into one normalized response.
///
/// Handles both framings: a complete `message` document (content array,
/// `stop_reason`) and the SSE event vocabulary (`content_block_start`,
/// `content_block_delta`, `message_delta`). A `tool_use` block's input
/// streams as `input_json_delta` fragments that only parse once the block
/// is complete.
#[derive(Default)]
struct StreamFold {
    text: String,
    tool_calls: Vec<ToolCall>,
    finish: Option<FinishSignal>,
    /// Block in flight during an SSE stream: (id, name, input fragments)
    open_block: Option<(String, String, String)>,
    malformed: bool,
}

impl StreamFold {
    fn apply(&mut self, doc: &Value) -> LlmResult<()> {
        let event: WireEvent =
            serde_json::from_value(doc.clone()).map_err(|e| LlmError::parse(e.to_string()))?;

        match event.event_type.as_deref() {
            // Complete document form
            Some("message") | None => {
                for block in event.content.iter().flatten() {
                    self.apply_block(block);
                }
                self.retain_finish(event.stop_reason.as_deref());
            }
            Some("message_start") => {
                if let Some(message) = &event.message {
                    for block in message.content.iter().flatten() {
                        self.apply_block(block);
                    }
                }
            }
            Some("content_block_start") => {
                if let Some(block) = &event.content_block {
                    match block.block_type.as_str() {
                        "tool_use" => {
                            self.open_block = Some((
                                block.id.clone().unwrap_or_default(),
                                block.name.clone().unwrap_or_default(),
                                String::new(),
                            ));
                        }
                        "text" => {
                            if let Some(text) = &block.text {
                                self.text.push_str(text);
                            }
                        }
                        _ => {}
                    }
                }
            }
            Some("content_block_delta") => {
                if let Some(delta) = &event.delta {
                    if let Some(text) = &delta.text {
                        self.text.push_str(text);
                    }
                    if let Some(partial) = &delta.partial_json {
                        if let Some((_, _, input)) = self.open_block.as_mut() {
                            input.push_str(partial);
                        }
                    }
                }
            }
            Some("content_block_stop") => self.close_open_block(),
            Some("message_delta") => {
                let reason = event
                    .delta
                    .as_ref()
                    .and_then(|d| d.stop_reason.as_deref());
                self.retain_finish(reason);
            }
            // ping, message_stop, error frames without payload
            _ => {}
        }
        Ok(())
    }

    fn apply_block(&mut self, block: &WireBlock) {
        match block.block_type.as_str() {
            "text" => {
                if let Some(text) = &block.text {
                    self.text.push_str(text);
                }
            }
            "tool_use" => {
                let name = block.name.clone().unwrap_or_default();
                self.tool_calls.push(ToolCall {
                    id: block
                        .id
                        .clone()
                        .unwrap_or_else(|| codeloom_core::message::synthesize_call_id(&name)),
                    name,
                    args: block.input.clone().unwrap_or(Value::Null),
                });
            }
            _ => {}
        }
    }

    fn close_open_block(&mut self) {
        if let Some((id, name, input)) = self.open_block.take() {
            let args = if input.trim().is_empty() {
                Ok(Value::Object(serde_json::Map::new()))
            } else {
                serde_json::from_str::<Value>(&input)
            };
            match args {
                Ok(args) => {
                    let id = if id.is_empty() {
                        codeloom_core::message::synthesize_call_id(&name)
                    } else {
                        id
                    };
                    self.tool_calls.push(ToolCall { id, name, args });
                }
                Err(_) => self.malformed = true,
            }
        }
    }

    fn retain_finish(&mut self, reason: Option<&str>) {
        retain_last(
            &mut self.finish,
            reason.and_then(AnthropicProvider::map_finish),
        );
    }

    fn finish(mut self) -> ProviderResponse {
        // A stream truncated before content_block_stop still yields the call
        self.close_open_block();
        if self.malformed && self.tool_calls.is_empty() {
            self.finish = Some(FinishSignal::MalformedFunctionCall);
        }
        ProviderResponse {
            text: if self.text.is_empty() {
                None
            } else {
                Some(self.text)
            },
            tool_calls: self.tool_calls,
            finish: self.finish,
        }
        .normalized()
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(default, rename = "type")]
    event_type: Option<String>,
    #[serde(default)]
    content: Option<Vec<WireBlock>>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    content_block: Option<WireBlock>,
    #[serde(default)]
    delta: Option<WireDelta>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<Vec<WireBlock>>,
}

#[derive(Debug, Deserialize)]
struct WireBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    partial_json: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderKind;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new(ProviderConfig::new(ProviderKind::Anthropic, "claude-test"))
    }

    #[test]
    fn test_build_request_system_is_top_level() {
        let p = provider();
        let history = vec![Message::user("hi")];
        let body =
            p.build_request_body(&history, Some("be terse"), &[], &RequestOptions::default());
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"][0]["type"], "text");
    }

    #[test]
    fn test_tool_result_block_carries_use_id() {
        let p = provider();
        let mut msg = Message::empty(Role::User);
        msg.push(Part::function_response(
            "run_shell",
            serde_json::json!({"output": "ok"}),
            "toolu_1",
        ));
        let wire = p.message_to_wire(&msg);
        assert_eq!(wire["content"][0]["type"], "tool_result");
        assert_eq!(wire["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn test_tool_schema_key_is_input_schema() {
        let p = provider();
        let tools = vec![FunctionDeclaration {
            name: "read_file".into(),
            description: "Read a file".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let body = p.build_request_body(&[Message::user("x")], None, &tools, &RequestOptions::default());
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn test_parse_document_form() {
        let p = provider();
        let body = r#"{
            "type": "message",
            "content": [
                {"type": "text", "text": "Running it now."},
                {"type": "tool_use", "id": "toolu_1", "name": "run_shell", "input": {"command": "ls"}}
            ],
            "stop_reason": "tool_use"
        }"#;
        let response = p.parse_body(body).unwrap();
        assert_eq!(response.text.as_deref(), Some("Running it now."));
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].id, "toolu_1");
        assert_eq!(response.finish, None);
    }

    #[test]
    fn test_parse_sse_stream_with_streamed_tool_input() {
        let p = provider();
        let body = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"content\":[]}}\n\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"On it.\"}}\n\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
            "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_2\",\"name\":\"write_file\"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"path\\\":\"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"a.py\\\"}\"}}\n\n",
            "data: {\"type\":\"content_block_stop\",\"index\":1}\n\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"}}\n\n",
            "data: {\"type\":\"message_stop\"}\n",
        );
        let response = p.parse_body(body).unwrap();
        assert_eq!(response.text.as_deref(), Some("On it."));
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].id, "toolu_2");
        assert_eq!(response.tool_calls[0].args["path"], "a.py");
        assert_eq!(response.finish, None);
    }

    #[test]
    fn test_parse_end_turn() {
        let p = provider();
        let body = r#"{"type": "message", "content": [{"type": "text", "text": "Done."}], "stop_reason": "end_turn"}"#;
        let response = p.parse_body(body).unwrap();
        assert_eq!(response.finish, Some(FinishSignal::Stop));
    }

    #[test]
    fn test_wire_text_survives_build_and_parse() {
        let p = provider();
        let reply = "Line one.\nLine two — with ünïcode.";
        let history = vec![Message::user("ask"), Message::model(reply)];
        let body = p.build_request_body(&history, None, &[], &RequestOptions::default());

        // Feed the assistant text from the built request back through the
        // response parser; it must come out byte-identical.
        let wire_text = body["messages"][1]["content"][0]["text"].as_str().unwrap();
        let doc = serde_json::json!({
            "type": "message",
            "content": [{"type": "text", "text": wire_text}],
            "stop_reason": "end_turn"
        });
        let response = p.parse_body(&doc.to_string()).unwrap();
        assert_eq!(response.text.as_deref(), Some(reply));
        assert_eq!(response.finish, Some(FinishSignal::Stop));
    }

    #[test]
    fn test_unparseable_streamed_input_flags_malformed() {
        let p = provider();
        let body = concat!(
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"t\",\"name\":\"edit\"}}\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{broken\"}}\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n",
        );
        let response = p.parse_body(body).unwrap();
        assert!(response.tool_calls.is_empty());
        assert_eq!(response.finish, Some(FinishSignal::MalformedFunctionCall));
    }
}
