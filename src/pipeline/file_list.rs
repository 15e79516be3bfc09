//! File-List Phase
//!
//! One model call that plans the project as a JSON array of file paths.
//! The parse budget is `phase_parse_retries`; each retry is a fresh model
//! call. Exhausting the budget is a terminal phase failure, never silent
//! partial data.

use serde::Deserialize;
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::pipeline::{extract_json, Pipeline};
use crate::prompts;

#[derive(Debug, Deserialize)]
struct FileEntry {
    file_path: String,
}

pub(crate) async fn run(pipeline: &Pipeline, request: &str) -> EngineResult<Vec<String>> {
    let prompt = prompts::file_list_prompt(request);

    let mut last_error = String::new();
    for attempt in 1..=pipeline.config.phase_parse_retries {
        pipeline.status(format!("Planning project files (attempt {})", attempt));
        let text = match pipeline
            .client
            .prompt(&prompt, Some(prompts::GENERATION_SYSTEM_PROMPT))
            .await
        {
            Ok(text) => text,
            Err(error) => {
                last_error = error.to_string();
                warn!(attempt, error = %last_error, "file list call failed");
                continue;
            }
        };

        match extract_json::<Vec<FileEntry>>(&text) {
            Ok(entries) if !entries.is_empty() => {
                let files: Vec<String> = entries.into_iter().map(|e| e.file_path).collect();
                pipeline.status(format!("Planned {} files", files.len()));
                return Ok(files);
            }
            Ok(_) => {
                last_error = "model returned an empty file list".to_string();
                warn!(attempt, "empty file list");
            }
            Err(error) => {
                last_error = error;
                warn!(attempt, error = %last_error, "file list unparseable");
            }
        }
    }

    Err(EngineError::phase("file list", last_error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_entry_shape() {
        let entries: Vec<FileEntry> =
            extract_json(r#"[{"file_path": "app.py"}, {"file_path": "templates/index.html"}]"#)
                .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].file_path, "templates/index.html");
    }
}
