//! Response Body Framing
//!
//! Providers serve the same logical endpoint in three framings: a single
//! JSON document, a JSON array of event documents, or a newline-delimited
//! event stream (optionally with SSE `data: ` prefixes and a `[DONE]`
//! sentinel). This module splits any of them into individual JSON event
//! documents so each adapter folds events uniformly.

use serde_json::Value;

use crate::types::{LlmError, LlmResult};

/// Split a raw response body into JSON event documents.
///
/// - A body that parses as a JSON array yields each non-null element.
/// - A body that parses as a single JSON object yields that object.
/// - Otherwise the body is treated line-by-line: `data: ` prefixes are
///   stripped, blank lines, SSE control lines, and `[DONE]` are skipped,
///   and each remaining line must parse as one JSON document.
pub fn split_documents(body: &str) -> LlmResult<Vec<Value>> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(LlmError::parse("empty response body"));
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return match value {
            Value::Array(items) => {
                Ok(items.into_iter().filter(|v| !v.is_null()).collect())
            }
            other => Ok(vec![other]),
        };
    }

    let mut documents = Vec::new();
    for line in trimmed.lines() {
        let line = line.trim();
        let payload = match line.strip_prefix("data: ") {
            Some(rest) => rest.trim(),
            None => line,
        };

        if payload.is_empty() || payload == "[DONE]" {
            continue;
        }
        // SSE control lines carry no event payload
        if payload.starts_with("event:")
            || payload.starts_with("id:")
            || payload.starts_with("retry:")
            || payload.starts_with(':')
        {
            continue;
        }

        let value: Value = serde_json::from_str(payload).map_err(|e| {
            LlmError::parse(format!("invalid event document: {} ({})", e, payload))
        })?;
        documents.push(value);
    }

    if documents.is_empty() {
        return Err(LlmError::parse("no event documents in response body"));
    }
    Ok(documents)
}

/// Keep the last non-null finish candidate while folding events.
pub fn retain_last<T>(slot: &mut Option<T>, candidate: Option<T>) {
    if candidate.is_some() {
        *slot = candidate;
    }
}
