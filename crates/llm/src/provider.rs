//! LLM Provider Trait
//!
//! Defines the common interface for all provider adapters and shared HTTP
//! error mapping.

use async_trait::async_trait;
use serde_json::Value;

use codeloom_core::message::{FunctionDeclaration, Message};

use crate::types::{LlmError, LlmResult, ProviderConfig, ProviderResponse, RequestOptions};

/// Trait that all provider adapters implement.
///
/// The two halves of the contract:
/// - `build_request_body` maps the core message model onto the provider's
///   wire shape.
/// - `parse_body` normalizes a raw response body (single document, JSON
///   array, or newline-delimited stream) into a [`ProviderResponse`].
///
/// `generate` ties both to an HTTP POST; the API key comes from the
/// credential source per call, never from the adapter's own config.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for identification and error messages.
    fn name(&self) -> &'static str;

    /// The model this adapter targets.
    fn model(&self) -> &str;

    /// Build the provider-specific JSON request body.
    fn build_request_body(
        &self,
        history: &[Message],
        system: Option<&str>,
        tools: &[FunctionDeclaration],
        options: &RequestOptions,
    ) -> Value;

    /// Parse and normalize a raw response body.
    fn parse_body(&self, body: &str) -> LlmResult<ProviderResponse>;

    /// Issue one request and return the normalized response.
    async fn generate(
        &self,
        history: &[Message],
        system: Option<&str>,
        tools: &[FunctionDeclaration],
        api_key: &str,
        options: &RequestOptions,
    ) -> LlmResult<ProviderResponse>;

    /// Get the configuration for this adapter.
    fn config(&self) -> &ProviderConfig;
}

/// Helper function to map HTTP error status codes into the error taxonomy
pub fn parse_http_error(status: u16, body: &str, provider: &str) -> LlmError {
    match status {
        401 => LlmError::AuthenticationFailed {
            message: format!("{}: Invalid API key", provider),
        },
        403 => LlmError::AuthenticationFailed {
            message: format!("{}: Access denied", provider),
        },
        404 => LlmError::ModelNotFound {
            model: body.to_string(),
        },
        429 => LlmError::RateLimited {
            message: body.to_string(),
            retry_after: None,
        },
        400 => LlmError::InvalidRequest {
            message: body.to_string(),
        },
        500..=599 => LlmError::ServerError {
            message: body.to_string(),
            status: Some(status),
        },
        _ => LlmError::Other {
            message: format!("HTTP {}: {}", status, body),
        },
    }
}

/// POST a JSON body and return the raw response text, mapping transport
/// and HTTP status failures into [`LlmError`].
pub async fn post_for_body(
    request: reqwest::RequestBuilder,
    body: &Value,
    provider: &str,
) -> LlmResult<String> {
    let response = request
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| LlmError::network(e.to_string()))?;

    let status = response.status().as_u16();
    let body_text = response
        .text()
        .await
        .map_err(|e| LlmError::network(e.to_string()))?;

    if status != 200 {
        return Err(parse_http_error(status, &body_text, provider));
    }
    Ok(body_text)
}
