//! Tool Execution Bridge
//!
//! Runs registered tools and converts every possible outcome into a
//! `ToolResult`. The bridge never returns `Err`: unknown tools, invalid
//! parameters, execution failures, panics, and cancellation all come back
//! as data, so a failing tool can be folded into the conversation instead
//! of aborting the session.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use codeloom_core::tool_trait::{ToolErrorKind, ToolRegistry, ToolResult};

/// Executes tools from a shared registry on isolated tasks.
pub struct ToolBridge {
    registry: Arc<ToolRegistry>,
}

impl ToolBridge {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this bridge executes from.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute one tool call. Infallible by contract; every failure mode
    /// maps to a [`ToolErrorKind`].
    ///
    /// The tool runs on a spawned task so a long-running tool cannot
    /// starve the caller's transport I/O, and a panicking tool is
    /// contained by the task boundary.
    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        cancel: &CancellationToken,
    ) -> ToolResult {
        let tool = match self.registry.get(name) {
            Some(tool) => tool,
            None => {
                warn!(tool = name, "tool call for unregistered tool");
                return ToolResult::err(
                    ToolErrorKind::UnknownTool,
                    format!("unknown tool: {}", name),
                );
            }
        };

        let validated = match tool.validate_params(&args) {
            Ok(validated) => validated,
            Err(error) => {
                return ToolResult::err(ToolErrorKind::InvalidParams, error.to_string());
            }
        };

        debug!(tool = name, "executing tool");
        let mut handle = tokio::spawn(async move { tool.execute(validated).await });

        tokio::select! {
            _ = cancel.cancelled() => {
                handle.abort();
                ToolResult::err(
                    ToolErrorKind::Cancelled,
                    format!("tool '{}' cancelled", name),
                )
            }
            joined = &mut handle => match joined {
                Ok(Ok(output)) => ToolResult::ok(output),
                Ok(Err(error)) => {
                    ToolResult::err(ToolErrorKind::ExecutionFailed, error.to_string())
                }
                Err(join_error) => {
                    warn!(tool = name, error = %join_error, "tool task failed");
                    let message = if join_error.is_panic() {
                        format!("tool '{}' panicked", name)
                    } else {
                        format!("tool '{}' task aborted", name)
                    };
                    ToolResult::err(ToolErrorKind::ExecutionFailed, message)
                }
            }
        }
    }
}
