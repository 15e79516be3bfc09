//! Progress Event Stream
//!
//! Ordered, provider-agnostic events emitted by the turn controller, the
//! generation pipeline, and the command fallback resolver. The caller
//! drains one channel; event order always matches the program order of the
//! side effects the events describe (a `ToolCallStarted` precedes its
//! `ToolResult`, and every request ends in exactly one terminal event).

use serde::{Deserialize, Serialize};

/// One event on the progress stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Text content from the model
    TextChunk { content: String },

    /// A tool invocation is about to execute
    ToolCallStarted {
        call_id: String,
        tool_name: String,
        /// JSON-serialized arguments
        arguments: String,
    },

    /// A tool invocation finished
    ToolResult {
        call_id: String,
        tool_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        display: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Pipeline checkpoint projection for the UI collaborator
    TodoUpdate { todos: Vec<Todo> },

    /// Human-readable status line from command execution and fallback
    /// resolution
    CommandStatus { message: String },

    /// Terminal failure for this request
    Error { message: String },

    /// All credentials exhausted; terminal, surfaced distinctly so the
    /// caller can prompt for new keys
    KeysExhausted,

    /// The request completed
    Done,
}

impl ProgressEvent {
    /// Whether this event terminates a request.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Error { .. } | ProgressEvent::KeysExhausted | ProgressEvent::Done
        )
    }
}

/// Status of one pipeline todo item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

/// A projection of pipeline progress surfaced to the UI collaborator.
/// Pipeline discipline keeps at most one item `InProgress` at a time; this
/// is not enforced structurally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub description: String,
    pub status: TodoStatus,
}

impl Todo {
    pub fn pending(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            status: TodoStatus::Pending,
        }
    }

    pub fn in_progress(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            status: TodoStatus::InProgress,
        }
    }

    pub fn completed(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            status: TodoStatus::Completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = ProgressEvent::TextChunk {
            content: "Hello".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"text_chunk\""));

        let parsed: ProgressEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }

    #[test]
    fn test_terminal_events() {
        assert!(ProgressEvent::Done.is_terminal());
        assert!(ProgressEvent::KeysExhausted.is_terminal());
        assert!(ProgressEvent::Error {
            message: "boom".into()
        }
        .is_terminal());
        assert!(!ProgressEvent::TextChunk {
            content: "hi".into()
        }
        .is_terminal());
    }

    #[test]
    fn test_todo_constructors() {
        let todo = Todo::in_progress("Generating files");
        assert_eq!(todo.status, TodoStatus::InProgress);

        let json = serde_json::to_string(&todo).unwrap();
        assert!(json.contains("\"status\":\"in_progress\""));
    }
}
