//! Shared LLM Types
//!
//! Provider configuration, the normalized response shape, the finish
//! signal taxonomy, and the LLM error hierarchy.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Which wire protocol family a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Google,
    OpenAi,
    Anthropic,
    Ollama,
    Custom,
}

/// Configuration for one provider instance. API keys are not held here;
/// the credential source supplies one per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: String,
    /// Override for the provider's default endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Extra headers for self-hosted gateways (custom provider)
    #[serde(default)]
    pub extra_headers: Vec<(String, String)>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            model: String::new(),
            base_url: None,
            max_tokens: 8192,
            temperature: 0.7,
            extra_headers: Vec::new(),
        }
    }
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

/// Per-call options. The timeout class distinguishes short interactive
/// calls from long multi-phase generation calls; it is separate from any
/// application-level retry budget.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub timeout_secs: u64,
    pub temperature_override: Option<f32>,
}

impl RequestOptions {
    /// Short timeout for interactive turns
    pub fn interactive() -> Self {
        Self {
            timeout_secs: 60,
            temperature_override: None,
        }
    }

    /// Long timeout for generation-phase calls
    pub fn generation() -> Self {
        Self {
            timeout_secs: 300,
            temperature_override: None,
        }
    }

    /// Replace the class default with a configured timeout
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Normalized reason generation stopped. `None` at the response level
/// means "continue" - more tool calls are pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishSignal {
    Stop,
    MaxTokens,
    Safety,
    MalformedFunctionCall,
}

impl std::fmt::Display for FinishSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinishSignal::Stop => write!(f, "STOP"),
            FinishSignal::MaxTokens => write!(f, "MAX_TOKENS"),
            FinishSignal::Safety => write!(f, "SAFETY"),
            FinishSignal::MalformedFunctionCall => write!(f, "MALFORMED_FUNCTION_CALL"),
        }
    }
}

/// A tool invocation the model requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// The normalized result of parsing one provider response body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish: Option<FinishSignal>,
}

impl ProviderResponse {
    /// Apply the compatibility rule: a document that exposes assistant
    /// text but no finish signal and no pending tool calls synthesizes
    /// `STOP`. Absence of a signal is never success or failure by itself.
    pub fn normalized(mut self) -> Self {
        if self.finish.is_none()
            && self.tool_calls.is_empty()
            && self.text.as_deref().is_some_and(|t| !t.is_empty())
        {
            self.finish = Some(FinishSignal::Stop);
        }
        self
    }

    /// Whether the response carries nothing at all - a protocol violation
    /// the turn controller must surface as an explicit error.
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().unwrap_or("").is_empty()
            && self.tool_calls.is_empty()
            && self.finish.is_none()
    }
}

/// Errors from provider interaction.
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// Network/HTTP transport failure; retryable with backoff
    #[error("Network error: {message}")]
    NetworkError { message: String },

    /// Unparseable or structurally invalid provider response; retried
    /// only within a phase's own retry budget
    #[error("Parse error: {message}")]
    ParseError { message: String },

    /// Invalid or rejected credential
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Provider-side rate limiting; retryable
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<u64>,
    },

    /// No remaining usable credentials; terminal
    #[error("All API keys exhausted")]
    KeysExhausted,

    /// Requested model does not exist
    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    /// Provider rejected the request shape
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Provider-side server error; retryable
    #[error("Server error ({status:?}): {message}")]
    ServerError {
        message: String,
        status: Option<u16>,
    },

    /// Anything else
    #[error("LLM error: {message}")]
    Other { message: String },
}

impl LlmError {
    /// Whether the retry wrapper should attempt this error again with
    /// backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::NetworkError { .. }
                | LlmError::RateLimited { .. }
                | LlmError::ServerError { .. }
        )
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }
}

/// Result type alias for LLM errors
pub type LlmResult<T> = Result<T, LlmError>;
