//! Testing utilities and mock implementations for E2E tests.
//!
//! This module provides mock implementations of the stage client traits,
//! allowing full pipeline runs without the real processing services.
//!
//! # Example
//!
//! ```rust,ignore
//! use dubbing_core::testing::{MockLipSyncer, MockSynthesizer, MockTranscriber};
//!
//! let transcriber = MockTranscriber::new();
//! let synthesizer = MockSynthesizer::new();
//! let lipsyncer = MockLipSyncer::new();
//!
//! // Configure mock behavior
//! synthesizer.set_next_error(StageError::malformed("empty audio")).await;
//! lipsyncer.set_random_latency(Duration::from_millis(5), Duration::from_millis(50)).await;
//!
//! // Wrap in StageClients and hand to the orchestrator...
//! ```

mod behavior;
mod mock_lipsyncer;
mod mock_synthesizer;
mod mock_transcriber;

pub use mock_lipsyncer::MockLipSyncer;
pub use mock_synthesizer::MockSynthesizer;
pub use mock_transcriber::MockTranscriber;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;
    use std::sync::Arc;

    use crate::config::StorageConfig;
    use crate::job::Segment;
    use crate::orchestrator::StageClients;

    use super::{MockLipSyncer, MockSynthesizer, MockTranscriber};

    /// The canonical two-segment transcription.
    pub fn two_segments() -> Vec<Segment> {
        vec![
            Segment::new(0.0, 2.0, "hello"),
            Segment::new(2.0, 5.0, "world"),
        ]
    }

    /// Storage directories under `root`.
    pub fn storage_config(root: &Path) -> StorageConfig {
        StorageConfig {
            upload_dir: root.join("uploads"),
            output_dir: root.join("outputs"),
            work_dir: root.join("work"),
        }
    }

    /// Bundle mock clients for the orchestrator.
    pub fn stage_clients(
        transcriber: &MockTranscriber,
        synthesizer: &MockSynthesizer,
        lipsyncer: &MockLipSyncer,
    ) -> StageClients {
        StageClients {
            transcriber: Arc::new(transcriber.clone()),
            synthesizer: Arc::new(synthesizer.clone()),
            lipsyncer: Arc::new(lipsyncer.clone()),
        }
    }

    /// Write a fake input video and return its path.
    pub fn write_video(dir: &Path, name: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(&path, format!("fake video {}", name));
        path
    }
}
