//! Codeloom Tools
//!
//! Tool execution plumbing for the orchestration engine:
//! - `bridge`: runs registered tools on isolated tasks and converts every
//!   outcome (including panics and cancellation) into a `ToolResult`
//! - `shell`: the shell executor collaborator used for commands, linting,
//!   and validation runs
//! - `fallback`: command execution with ordered fallbacks, failure-keyword
//!   detection, and AI-assisted failure analysis

pub mod bridge;
pub mod fallback;
pub mod shell;

// Re-export main types
pub use bridge::ToolBridge;
pub use fallback::{
    CommandWithFallbacks, FailureAnalysis, FailureAnalyst, FallbackPlan, FallbackResolver,
};
pub use shell::{ShellExecutor, ShellOutput, SystemShell};
