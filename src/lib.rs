//! Codeloom
//!
//! Multi-provider conversational agent orchestration engine. Drives a
//! turn-based exchange between a user, one of several LLM HTTP providers,
//! and a registry of executable tools, until the task is judged complete.
//!
//! Module Organization:
//! - `engine`: the facade callers hold - owns conversation state, routes a
//!   message to the turn loop or the generation pipeline
//! - `orchestrator`: the bounded turn state machine and the shared
//!   model-call primitive
//! - `intent`: classifies an incoming message into a task shape
//! - `pipeline`: the multi-phase plan/specify/generate/validate workflow
//! - `analyst`: model-backed command failure analysis
//! - `prompts`: prompt templates for pipeline phases
//! - `error`: engine-level error taxonomy

pub mod analyst;
pub mod engine;
pub mod error;
pub mod intent;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;

// Re-export main types
pub use engine::{Engine, EngineMode};
pub use error::{EngineError, EngineResult};
pub use intent::{detect_intent, Intent};
pub use orchestrator::{ConversationState, ModelClient, Orchestrator};
pub use pipeline::{PhasePlan, Pipeline, PipelineReport};

// Re-export the workspace crates under their short names
pub use codeloom_core as core;
pub use codeloom_llm as llm;
pub use codeloom_tools as tools;
