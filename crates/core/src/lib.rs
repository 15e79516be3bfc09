//! Codeloom Core
//!
//! Foundational types for the Codeloom workspace: the provider-agnostic
//! message model, the progress event stream, error types, the tool
//! abstraction, and engine configuration. This crate has zero dependencies
//! on provider or execution code.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `message` - Conversation model (`Message`, `Part`, `FunctionDeclaration`)
//! - `events` - Progress event stream (`ProgressEvent`, `Todo`)
//! - `tool_trait` - Tool abstraction (`Tool`, `ToolRegistry`, `ToolResult`)
//! - `config` - Engine configuration (`EngineConfig`)
//!
//! ## Design Principles
//!
//! 1. **Minimal dependencies** - serde/async-trait/thiserror/uuid only
//! 2. **Trait-based seams** - tools and progress sinks are mockable
//! 3. **Unidirectional dependency** - this crate depends on nothing else
//!    in the workspace

pub mod config;
pub mod error;
pub mod events;
pub mod message;
pub mod tool_trait;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Message Model ──────────────────────────────────────────────────────
pub use message::{synthesize_call_id, FunctionDeclaration, Message, Part, Role};

// ── Progress Events ────────────────────────────────────────────────────
pub use events::{ProgressEvent, Todo, TodoStatus};

// ── Tool Abstraction ───────────────────────────────────────────────────
pub use tool_trait::{Tool, ToolError, ToolErrorKind, ToolOutput, ToolRegistry, ToolResult};

// ── Configuration ──────────────────────────────────────────────────────
pub use config::EngineConfig;
