//! Mock transcriber for testing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::behavior::MockBehavior;
use super::fixtures;
use crate::job::Segment;
use crate::stage_client::{
    ServiceHealth, StageError, StageProgress, Transcriber, Transcription, TranscriptionRequest,
};

type SegmentsFn = Arc<dyn Fn(&TranscriptionRequest) -> Vec<Segment> + Send + Sync>;

/// Mock implementation of the Transcriber trait.
///
/// Returns the configured segments (two by default) after the configured
/// latency, and records every request it receives.
///
/// # Example
///
/// ```rust,ignore
/// use dubbing_core::testing::MockTranscriber;
///
/// let transcriber = MockTranscriber::new();
/// transcriber.set_segments(vec![Segment::new(0.0, 1.0, "hola")]).await;
/// transcriber.set_next_error(StageError::malformed("no segments")).await;
/// ```
#[derive(Clone)]
pub struct MockTranscriber {
    behavior: MockBehavior,
    segments: Arc<RwLock<Vec<Segment>>>,
    segments_fn: Arc<RwLock<Option<SegmentsFn>>>,
    calls: Arc<RwLock<Vec<TranscriptionRequest>>>,
}

impl Default for MockTranscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTranscriber {
    pub fn new() -> Self {
        Self {
            behavior: MockBehavior::default(),
            segments: Arc::new(RwLock::new(fixtures::two_segments())),
            segments_fn: Arc::new(RwLock::new(None)),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn set_segments(&self, segments: Vec<Segment>) {
        *self.segments.write().await = segments;
    }

    /// Derive segments from each request instead of returning a fixed list.
    pub async fn set_segments_fn(
        &self,
        f: impl Fn(&TranscriptionRequest) -> Vec<Segment> + Send + Sync + 'static,
    ) {
        *self.segments_fn.write().await = Some(Arc::new(f));
    }

    pub async fn set_latency(&self, latency: Duration) {
        self.behavior.set_latency(latency).await;
    }

    pub async fn set_random_latency(&self, min: Duration, max: Duration) {
        self.behavior.set_random_latency(min, max).await;
    }

    pub async fn set_next_error(&self, error: StageError) {
        self.behavior.set_next_error(error).await;
    }

    pub async fn set_healthy(&self, healthy: bool) {
        self.behavior.set_healthy(healthy).await;
    }

    pub async fn recorded_calls(&self) -> Vec<TranscriptionRequest> {
        self.calls.read().await.clone()
    }

    pub async fn calls_for(&self, job_id: &str) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.job_id == job_id)
            .count()
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(
        &self,
        request: TranscriptionRequest,
        progress: StageProgress,
    ) -> Result<Transcription, StageError> {
        self.calls.write().await.push(request.clone());

        progress.report(0.0, "Uploading video for transcription...");
        self.behavior.delay().await;

        if let Some(error) = self.behavior.take_error().await {
            return Err(error);
        }

        let segments = match self.segments_fn.read().await.as_ref() {
            Some(f) => f(&request),
            None => self.segments.read().await.clone(),
        };
        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        progress.report(1.0, "Transcription complete");

        Ok(Transcription {
            segments,
            text,
            reference_audio: None,
        })
    }

    async fn health(&self) -> ServiceHealth {
        self.behavior.health().await
    }
}
