//! Custom Endpoint Provider
//!
//! Adapter for self-hosted or gateway endpoints that speak the OpenAI
//! chat-completions shape. Requires an explicit base URL and forwards
//! any configured extra headers; everything else delegates to the
//! OpenAI adapter.

use async_trait::async_trait;
use serde_json::Value;

use codeloom_core::message::{FunctionDeclaration, Message};

use crate::http_client::build_http_client;
use crate::openai::OpenAiProvider;
use crate::provider::{post_for_body, LlmProvider};
use crate::types::{
    LlmError, LlmResult, ProviderConfig, ProviderResponse, RequestOptions,
};

/// OpenAI-compatible custom endpoint provider
pub struct CustomProvider {
    inner: OpenAiProvider,
}

impl CustomProvider {
    /// Create a new adapter. The configuration must carry a base URL.
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        if config.base_url.is_none() {
            return Err(LlmError::InvalidRequest {
                message: "custom provider requires an explicit base URL".to_string(),
            });
        }
        Ok(Self {
            inner: OpenAiProvider::new(config),
        })
    }
}

#[async_trait]
impl LlmProvider for CustomProvider {
    fn name(&self) -> &'static str {
        "custom"
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn build_request_body(
        &self,
        history: &[Message],
        system: Option<&str>,
        tools: &[FunctionDeclaration],
        options: &RequestOptions,
    ) -> Value {
        self.inner.build_request_body(history, system, tools, options)
    }

    fn parse_body(&self, body: &str) -> LlmResult<ProviderResponse> {
        self.inner.parse_body(body)
    }

    async fn generate(
        &self,
        history: &[Message],
        system: Option<&str>,
        tools: &[FunctionDeclaration],
        api_key: &str,
        options: &RequestOptions,
    ) -> LlmResult<ProviderResponse> {
        let config = self.config();
        // Validated at construction
        let endpoint = config.base_url.clone().unwrap_or_default();

        let body = self.build_request_body(history, system, tools, options);
        let client = build_http_client(options.timeout_secs);
        let mut request = client.post(&endpoint);
        if !api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }
        for (name, value) in &config.extra_headers {
            request = request.header(name, value);
        }
        let body_text = post_for_body(request, &body, self.name()).await?;
        self.parse_body(&body_text)
    }

    fn config(&self) -> &ProviderConfig {
        self.inner.config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FinishSignal, ProviderKind};

    #[test]
    fn test_requires_base_url() {
        let config = ProviderConfig::new(ProviderKind::Custom, "local-model");
        assert!(matches!(
            CustomProvider::new(config),
            Err(LlmError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_parses_openai_shape() {
        let config = ProviderConfig::new(ProviderKind::Custom, "local-model")
            .with_base_url("http://gateway:8000/v1/chat/completions");
        let p = CustomProvider::new(config).unwrap();
        let body = r#"{"choices": [{"message": {"content": "ok"}, "finish_reason": "stop"}]}"#;
        let response = p.parse_body(body).unwrap();
        assert_eq!(response.text.as_deref(), Some("ok"));
        assert_eq!(response.finish, Some(FinishSignal::Stop));
    }

    #[test]
    fn test_wire_text_survives_build_and_parse() {
        let config = ProviderConfig::new(ProviderKind::Custom, "local-model")
            .with_base_url("http://gateway:8000/v1/chat/completions");
        let p = CustomProvider::new(config).unwrap();
        let reply = "Line one.\nLine two — with ünïcode.";
        let history = vec![Message::user("ask"), Message::model(reply)];
        let body = p.build_request_body(&history, None, &[], &RequestOptions::default());

        let wire_text = body["messages"][1]["content"].as_str().unwrap();
        let doc = serde_json::json!({
            "choices": [{
                "message": {"content": wire_text},
                "finish_reason": "stop"
            }]
        });
        let response = p.parse_body(&doc.to_string()).unwrap();
        assert_eq!(response.text.as_deref(), Some(reply));
        assert_eq!(response.finish, Some(FinishSignal::Stop));
    }

    #[test]
    fn test_extra_headers_preserved_in_config() {
        let mut config = ProviderConfig::new(ProviderKind::Custom, "local-model")
            .with_base_url("http://gateway:8000/v1/chat/completions");
        config
            .extra_headers
            .push(("X-Gateway-Token".to_string(), "abc".to_string()));
        let p = CustomProvider::new(config).unwrap();
        assert_eq!(p.config().extra_headers.len(), 1);
    }
}
