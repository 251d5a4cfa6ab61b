//! Stage client traits.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::error::StageError;
use super::health::ServiceHealth;
use super::types::{
    LipSyncRequest, LipSyncedVideo, SynthesisRequest, SynthesizedAudio, Transcription,
    TranscriptionRequest,
};

type ReportFn = dyn Fn(f32, &str) + Send + Sync;

/// Sink for intra-stage progress.
///
/// Fractions are in `[0.0, 1.0]` of the current stage; the orchestrator maps
/// them onto the stage's band of the overall progress bar.
#[derive(Clone, Default)]
pub struct StageProgress {
    report: Option<Arc<ReportFn>>,
}

impl StageProgress {
    pub fn new(report: impl Fn(f32, &str) + Send + Sync + 'static) -> Self {
        Self {
            report: Some(Arc::new(report)),
        }
    }

    /// A sink that discards every report.
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn report(&self, fraction: f32, message: &str) {
        if let Some(report) = &self.report {
            report(fraction, message);
        }
    }
}

impl fmt::Debug for StageProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageProgress")
            .field("active", &self.report.is_some())
            .finish()
    }
}

/// Transcribes and translates the speech in a video.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        request: TranscriptionRequest,
        progress: StageProgress,
    ) -> Result<Transcription, StageError>;

    async fn health(&self) -> ServiceHealth;
}

/// Synthesizes dubbed speech for translated segments in the speaker's voice.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        request: SynthesisRequest,
        progress: StageProgress,
    ) -> Result<SynthesizedAudio, StageError>;

    async fn health(&self) -> ServiceHealth;
}

/// Re-renders a video's mouth region to match a new audio track.
#[async_trait]
pub trait LipSyncer: Send + Sync {
    async fn lipsync(
        &self,
        request: LipSyncRequest,
        progress: StageProgress,
    ) -> Result<LipSyncedVideo, StageError>;

    async fn health(&self) -> ServiceHealth;
}
