//! Conversation Message Model
//!
//! The provider-agnostic representation of a conversation: roles, text
//! parts, function calls, and function responses, plus the function schema
//! advertised to providers. Every provider adapter converts to and from
//! this model, so a text-only history must survive a round trip through any
//! wire format unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Who produced a message. Providers with richer role sets (system,
/// assistant, tool) map onto these two when converting back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
}

/// One ordered element of a message.
///
/// `id` correlates a `FunctionCall` to its `FunctionResponse` within one
/// turn. When a provider omits an id, one is synthesized with
/// [`synthesize_call_id`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    FunctionCall {
        name: String,
        args: Value,
        id: String,
    },
    FunctionResponse {
        name: String,
        response: Value,
        id: String,
    },
}

impl Part {
    /// Create a text part
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    /// Create a function call part
    pub fn function_call(name: impl Into<String>, args: Value, id: impl Into<String>) -> Self {
        Part::FunctionCall {
            name: name.into(),
            args,
            id: id.into(),
        }
    }

    /// Create a function response part
    pub fn function_response(
        name: impl Into<String>,
        response: Value,
        id: impl Into<String>,
    ) -> Self {
        Part::FunctionResponse {
            name: name.into(),
            response,
            id: id.into(),
        }
    }

    /// The text content of this part, if it is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A single conversation message: a role plus an ordered, append-only
/// sequence of parts. A message is owned exclusively by the conversation
/// history until the history is explicitly cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    /// Create a user message with a single text part
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    /// Create a model message with a single text part
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::text(text)],
        }
    }

    /// Create an empty message for a role
    pub fn empty(role: Role) -> Self {
        Self {
            role,
            parts: Vec::new(),
        }
    }

    /// Append a part, preserving order
    pub fn push(&mut self, part: Part) {
        self.parts.push(part);
    }

    /// All text parts joined with newlines
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whether this message carries any function call parts
    pub fn has_function_calls(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::FunctionCall { .. }))
    }
}

/// Schema of one callable function, advertised to a provider so the model
/// can request tool invocations. `parameters` is a JSON Schema object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl FunctionDeclaration {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Synthesize a deterministic-format call id for providers that omit one:
/// function name, unix-millis timestamp, and a random suffix. Unique per
/// call even when the same function is called twice in one millisecond.
pub fn synthesize_call_id(name: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", name, millis, &suffix[..8])
}
