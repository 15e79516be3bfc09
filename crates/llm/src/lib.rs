//! Codeloom LLM
//!
//! Provider-agnostic access to multiple LLM HTTP APIs:
//! - Google-style (`contents`/`parts`/`functionCall`)
//! - OpenAI-style (`messages`/`tool_calls`)
//! - Anthropic-style (`content` blocks with `tool_use`)
//! - Ollama-style (`messages` with `done` flag)
//! - Generic custom endpoints (OpenAI-shaped pass-through)
//!
//! Every adapter converts between the core message model and its wire
//! format, and normalizes the provider's terminal signal into one
//! [`FinishSignal`]. Adapters accept both newline-delimited event streams
//! and single JSON-document bodies for the same logical endpoint.

pub mod anthropic;
pub mod credentials;
pub mod custom;
pub mod framing;
pub mod google;
pub mod http_client;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod types;

// Re-export main types
pub use anthropic::AnthropicProvider;
pub use credentials::{call_with_retry, KeyRing, KeySource};
pub use custom::CustomProvider;
pub use google::GoogleProvider;
pub use http_client::build_http_client;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use provider::LlmProvider;
pub use types::*;
