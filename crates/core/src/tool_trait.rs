//! Tool Abstraction
//!
//! The tool trait, the registry the engine looks tools up in, and the
//! `ToolResult` every invocation produces. Validation is split from
//! execution so the bridge can report invalid parameters as a distinct
//! error kind without ever invoking the tool.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::message::FunctionDeclaration;

// ============================================================================
// Tool Results
// ============================================================================

/// Classification of a tool failure. Unknown tool and invalid parameters
/// are distinct reported kinds, not exceptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    UnknownTool,
    InvalidParams,
    ExecutionFailed,
    Cancelled,
}

/// Error payload carried inside a [`ToolResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolError {
    pub message: String,
    pub kind: ToolErrorKind,
}

/// The raw output a tool's `execute` produces on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Content folded back into the conversation for the model
    pub llm_content: String,
    /// Content rendered for the user
    pub return_display: String,
}

impl ToolOutput {
    /// Output where the model-facing and user-facing content are the same.
    pub fn uniform(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            llm_content: content.clone(),
            return_display: content,
        }
    }
}

/// Result of one tool invocation. Produced once, never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub llm_content: String,
    pub return_display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolResult {
    /// Create a successful result from a tool's output
    pub fn ok(output: ToolOutput) -> Self {
        Self {
            llm_content: output.llm_content,
            return_display: output.return_display,
            error: None,
        }
    }

    /// Create an error result with the given kind
    pub fn err(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            llm_content: format!("Error: {}", message),
            return_display: message.clone(),
            error: Some(ToolError { message, kind }),
        }
    }

    /// Whether the invocation succeeded
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// The JSON payload appended to history as a function response
    pub fn response_value(&self) -> Value {
        match &self.error {
            None => serde_json::json!({ "output": self.llm_content }),
            Some(err) => serde_json::json!({
                "error": err.message,
                "kind": err.kind,
            }),
        }
    }
}

// ============================================================================
// Tool Trait
// ============================================================================

/// A named, schema-described capability the model can invoke.
///
/// `validate_params` runs before `execute`; it returns the typed/normalized
/// arguments or a validation error, so execution never sees malformed
/// input.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name of this tool (e.g., "read_file", "run_shell")
    fn name(&self) -> &str;

    /// Human-readable description advertised to the model
    fn description(&self) -> &str;

    /// JSON Schema describing input parameters
    fn parameters_schema(&self) -> Value;

    /// Validate and normalize raw arguments. Default accepts any object.
    fn validate_params(&self, args: &Value) -> CoreResult<Value> {
        if args.is_object() || args.is_null() {
            Ok(args.clone())
        } else {
            Err(CoreError::validation(format!(
                "{}: arguments must be a JSON object",
                self.name()
            )))
        }
    }

    /// Execute with validated arguments.
    async fn execute(&self, args: Value) -> CoreResult<ToolOutput>;
}

// ============================================================================
// Tool Registry
// ============================================================================

/// Registry of tools with O(1) lookup and insertion-ordered iteration, so
/// advertised declarations are deterministic across requests.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Insertion order for deterministic iteration.
    order: Vec<String>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Check if a tool is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Function declarations in registration order, suitable for
    /// advertising to a provider.
    pub fn function_declarations(&self) -> Vec<FunctionDeclaration> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| {
                FunctionDeclaration::new(
                    tool.name(),
                    tool.description(),
                    tool.parameters_schema(),
                )
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes its input"
        }

        fn parameters_schema(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" }
                },
                "required": ["input"]
            })
        }

        fn validate_params(&self, args: &Value) -> CoreResult<Value> {
            match args.get("input").and_then(|v| v.as_str()) {
                Some(_) => Ok(args.clone()),
                None => Err(CoreError::validation("echo: 'input' is required")),
            }
        }

        async fn execute(&self, args: Value) -> CoreResult<ToolOutput> {
            let input = args.get("input").and_then(|v| v.as_str()).unwrap_or("");
            Ok(ToolOutput::uniform(format!("echo: {}", input)))
        }
    }

    #[test]
    fn test_registry_insertion_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.names(), vec!["echo"]);
        assert!(registry.contains("echo"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_function_declarations() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let decls = registry.function_declarations();
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].name, "echo");
        assert!(decls[0].parameters.is_object());
    }

    #[tokio::test]
    async fn test_tool_execute() {
        let tool = EchoTool;
        let args = serde_json::json!({"input": "hi"});
        let validated = tool.validate_params(&args).unwrap();
        let output = tool.execute(validated).await.unwrap();
        assert_eq!(output.llm_content, "echo: hi");
    }

    #[test]
    fn test_validate_rejects_missing_param() {
        let tool = EchoTool;
        let err = tool.validate_params(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_tool_result_ok_and_err() {
        let ok = ToolResult::ok(ToolOutput::uniform("done"));
        assert!(ok.is_ok());
        assert_eq!(ok.llm_content, "done");

        let err = ToolResult::err(ToolErrorKind::UnknownTool, "no such tool: frobnicate");
        assert!(!err.is_ok());
        assert_eq!(err.error.as_ref().unwrap().kind, ToolErrorKind::UnknownTool);
        assert!(err.llm_content.starts_with("Error:"));
    }

    #[test]
    fn test_tool_result_response_value() {
        let ok = ToolResult::ok(ToolOutput::uniform("content"));
        assert_eq!(ok.response_value()["output"], "content");

        let err = ToolResult::err(ToolErrorKind::InvalidParams, "bad args");
        assert_eq!(err.response_value()["error"], "bad args");
        assert_eq!(err.response_value()["kind"], "invalid_params");
    }
}
