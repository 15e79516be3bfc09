//! Model-Backed Failure Analyst
//!
//! Implements the tools crate's `FailureAnalyst` seam with a model call:
//! the failing command, a truncated output tail, and the project's
//! manifest markers go into one prompt, and a JSON diagnosis comes back.
//! A diagnosis that cannot be parsed is dropped, not an error - the
//! resolver just proceeds without remedies.

use async_trait::async_trait;
use tracing::warn;

use codeloom_tools::fallback::{FailureAnalysis, FailureAnalyst};

use crate::orchestrator::ModelClient;
use crate::pipeline::extract_json;
use crate::prompts;

pub struct ModelAnalyst {
    client: ModelClient,
}

impl ModelAnalyst {
    pub fn new(client: ModelClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FailureAnalyst for ModelAnalyst {
    async fn analyze(
        &self,
        command: &str,
        output: &str,
        project_markers: &[String],
    ) -> Option<FailureAnalysis> {
        let prompt = prompts::failure_analysis_prompt(command, output, project_markers);
        let text = match self.client.prompt(&prompt, None).await {
            Ok(text) => text,
            Err(error) => {
                warn!(%error, "failure analysis call failed");
                return None;
            }
        };
        match extract_json::<FailureAnalysis>(&text) {
            Ok(analysis) => Some(analysis),
            Err(error) => {
                warn!(%error, "failure analysis response unparseable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::pipeline::extract_json;
    use codeloom_tools::fallback::FailureAnalysis;

    #[test]
    fn test_analysis_json_shape_parses() {
        let text = r#"Here is the diagnosis:
{"reason": "missing dependency", "fallback_plans": [
  {"command": "pip install flask", "description": "install flask", "should_retry_original": true}
]}"#;
        let analysis: FailureAnalysis = extract_json(text).unwrap();
        assert_eq!(analysis.fallback_plans.len(), 1);
        assert!(analysis.fallback_plans[0].should_retry_original);
    }
}
