//! Metadata Phase
//!
//! One model call that describes every planned file: purpose, exports,
//! imports, and relationships to other files. Unparseable output is
//! retried within the `phase_parse_retries` budget; count-match against
//! the file list is validated with exactly one retry using a stronger
//! prompt.
//! Coherence checking (relationships resolve, imports find exports) is
//! advisory: violations are logged, never blocking.

use std::collections::HashSet;

use serde::Deserialize;
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::pipeline::{extract_json, Pipeline};
use crate::prompts;

#[derive(Debug, Clone, Deserialize)]
pub struct FileMetadata {
    pub file_path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub exports: Vec<String>,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<String>,
}

pub(crate) async fn run(
    pipeline: &Pipeline,
    request: &str,
    files: &[String],
) -> EngineResult<Vec<FileMetadata>> {
    pipeline.status("Describing file metadata");

    // First attempt, then exactly one retry with a stronger prompt.
    let first = fetch(pipeline, &prompts::metadata_prompt(request, files)).await?;
    if first.len() == files.len() {
        check_coherence(&first, files);
        return Ok(first);
    }

    warn!(
        expected = files.len(),
        got = first.len(),
        "metadata count mismatch, retrying with stronger prompt"
    );
    pipeline.status("Metadata count mismatch, retrying");
    let second = fetch(pipeline, &prompts::metadata_retry_prompt(request, files)).await?;
    if second.len() == files.len() {
        check_coherence(&second, files);
        return Ok(second);
    }

    Err(EngineError::phase(
        "metadata",
        format!(
            "expected {} entries, got {} after retry",
            files.len(),
            second.len()
        ),
    ))
}

/// One metadata call with the same parse budget as the file-list phase;
/// each retry is a fresh model call against the same prompt.
async fn fetch(pipeline: &Pipeline, prompt: &str) -> EngineResult<Vec<FileMetadata>> {
    let mut last_error = String::new();
    for attempt in 1..=pipeline.config.phase_parse_retries {
        let text = match pipeline
            .client
            .prompt(prompt, Some(prompts::GENERATION_SYSTEM_PROMPT))
            .await
        {
            Ok(text) => text,
            Err(error) => {
                last_error = error.to_string();
                warn!(attempt, error = %last_error, "metadata call failed");
                continue;
            }
        };

        match extract_json::<Vec<FileMetadata>>(&text) {
            Ok(entries) => return Ok(entries),
            Err(error) => {
                last_error = error;
                warn!(attempt, error = %last_error, "metadata unparseable");
            }
        }
    }

    Err(EngineError::phase("metadata", last_error))
}

/// Advisory cross-file checks: every relationship must name a planned
/// file, and every import should find a matching export somewhere.
fn check_coherence(metadata: &[FileMetadata], files: &[String]) {
    let known: HashSet<&str> = files.iter().map(String::as_str).collect();
    let all_exports: HashSet<&str> = metadata
        .iter()
        .flat_map(|m| m.exports.iter().map(String::as_str))
        .collect();

    for entry in metadata {
        for relation in &entry.relationships {
            if !known.contains(relation.as_str()) {
                warn!(
                    file = %entry.file_path,
                    relation = %relation,
                    "relationship does not resolve to a planned file"
                );
            }
        }
        for import in &entry.imports {
            let resolved = all_exports.contains(import.as_str())
                || known.contains(import.as_str());
            if !resolved {
                warn!(
                    file = %entry.file_path,
                    import = %import,
                    "import finds no matching export"
                );
            }
        }
    }
}
