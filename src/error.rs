//! Engine Error Taxonomy
//!
//! Wraps the core and LLM error types and adds the engine-level failure
//! modes: protocol violations, turn ceiling, pipeline phase failures, and
//! cancellation. Tool and command failures are deliberately absent - they
//! are data (`ToolResult`, `FailureAnalysis`), never errors.

use thiserror::Error;

use codeloom_core::error::CoreError;
use codeloom_llm::types::LlmError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// Response carried no text, no tool calls, and no finish signal
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Turn counter hit the configured ceiling
    #[error("maximum turns reached ({0})")]
    MaxTurnsReached(u32),

    /// A pipeline phase exhausted its retry budget
    #[error("{phase} phase failed: {message}")]
    PhaseFailed { phase: String, message: String },

    /// Cooperative cancellation observed
    #[error("operation cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn phase(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PhaseFailed {
            phase: phase.into(),
            message: message.into(),
        }
    }

    /// Whether the caller should surface this as key exhaustion rather
    /// than a generic error.
    pub fn is_keys_exhausted(&self) -> bool {
        matches!(self, EngineError::Llm(LlmError::KeysExhausted))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
