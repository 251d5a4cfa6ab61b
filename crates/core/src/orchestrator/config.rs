//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the pipeline orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorConfig {
    /// Maximum pipeline runs executing at once (0 = unlimited).
    /// Jobs beyond the limit stay queued until a slot frees.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Language hint passed to the transcription service.
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Per-subscriber progress buffer. Slow subscribers lose the oldest
    /// events beyond this many.
    #[serde(default = "default_progress_buffer")]
    pub progress_buffer: usize,
}

fn default_max_concurrent_jobs() -> usize {
    2
}

fn default_source_language() -> String {
    "en".to_string()
}

fn default_progress_buffer() -> usize {
    64
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            source_language: default_source_language(),
            progress_buffer: default_progress_buffer(),
        }
    }
}
