//! Engine Configuration
//!
//! Tunables for the turn controller, the generation pipeline, and the
//! fallback resolver. Timeouts here are per-HTTP-call classes; they are
//! distinct from the application-level retry budgets.

use serde::{Deserialize, Serialize};

/// Configuration shared across the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hard ceiling on the conversation turn counter.
    pub max_turns: u32,
    /// Attempts for the validation/repair loop.
    pub max_validation_attempts: u32,
    /// Parse retries for structured phase output (file list, metadata).
    pub phase_parse_retries: u32,
    /// Timeout for interactive provider calls, in seconds.
    pub interactive_timeout_secs: u64,
    /// Timeout for multi-phase generation calls, in seconds.
    pub generation_timeout_secs: u64,
    /// Root directory of the user's workspace.
    pub workspace_root: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_turns: 100,
            max_validation_attempts: 5,
            phase_parse_retries: 3,
            interactive_timeout_secs: 60,
            generation_timeout_secs: 300,
            workspace_root: ".".to_string(),
        }
    }
}

impl EngineConfig {
    /// Set the workspace root
    pub fn with_workspace_root(mut self, root: impl Into<String>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Set the turn ceiling
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Set the validation attempt budget
    pub fn with_max_validation_attempts(mut self, attempts: u32) -> Self {
        self.max_validation_attempts = attempts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_turns, 100);
        assert_eq!(config.max_validation_attempts, 5);
        assert_eq!(config.phase_parse_retries, 3);
    }

    #[test]
    fn test_builder_setters() {
        let config = EngineConfig::default()
            .with_workspace_root("/tmp/project")
            .with_max_turns(10);
        assert_eq!(config.workspace_root, "/tmp/project");
        assert_eq!(config.max_turns, 10);
    }
}
