//! Mock synthesizer for testing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::behavior::MockBehavior;
use crate::stage_client::{
    ServiceHealth, StageError, StageProgress, SynthesisRequest, SynthesizedAudio, Synthesizer,
};

/// Mock implementation of the Synthesizer trait.
///
/// Writes a small fake WAV tagged with the job id to the requested output
/// path, so later stages and assertions can trace where audio came from.
#[derive(Clone, Default)]
pub struct MockSynthesizer {
    behavior: MockBehavior,
    calls: Arc<RwLock<Vec<SynthesisRequest>>>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
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

    /// Fail every call with an error built by `make_error`, or stop doing so.
    pub async fn set_always_fail(&self, make_error: Option<fn() -> StageError>) {
        self.behavior.set_always_fail(make_error).await;
    }

    pub async fn set_healthy(&self, healthy: bool) {
        self.behavior.set_healthy(healthy).await;
    }

    pub async fn recorded_calls(&self) -> Vec<SynthesisRequest> {
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
impl Synthesizer for MockSynthesizer {
    async fn synthesize(
        &self,
        request: SynthesisRequest,
        progress: StageProgress,
    ) -> Result<SynthesizedAudio, StageError> {
        self.calls.write().await.push(request.clone());

        progress.report(0.0, "Synthesizing dubbed audio...");
        self.behavior.delay().await;

        if let Some(error) = self.behavior.take_error().await {
            return Err(error);
        }

        for (i, _) in request.segments.iter().enumerate() {
            let fraction = (i + 1) as f32 / request.segments.len() as f32;
            progress.report(fraction, &format!("Synthesized segment {}", i + 1));
        }

        let body = format!("RIFF mock-audio job={}", request.job_id);
        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&request.output, body.as_bytes()).await?;

        Ok(SynthesizedAudio {
            path: request.output,
            size_bytes: body.len() as u64,
        })
    }

    async fn health(&self) -> ServiceHealth {
        self.behavior.health().await
    }
}
