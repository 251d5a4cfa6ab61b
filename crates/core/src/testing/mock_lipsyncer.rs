//! Mock lip syncer for testing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::behavior::MockBehavior;
use crate::stage_client::{
    LipSyncRequest, LipSyncedVideo, LipSyncer, ServiceHealth, StageError, StageProgress,
};

/// Mock implementation of the LipSyncer trait.
///
/// Writes a fake MP4 to the requested output path that embeds the job id and
/// the contents of the audio it was given.
#[derive(Clone, Default)]
pub struct MockLipSyncer {
    behavior: MockBehavior,
    calls: Arc<RwLock<Vec<LipSyncRequest>>>,
}

impl MockLipSyncer {
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

    pub async fn set_always_fail(&self, make_error: Option<fn() -> StageError>) {
        self.behavior.set_always_fail(make_error).await;
    }

    pub async fn set_healthy(&self, healthy: bool) {
        self.behavior.set_healthy(healthy).await;
    }

    pub async fn recorded_calls(&self) -> Vec<LipSyncRequest> {
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
impl LipSyncer for MockLipSyncer {
    async fn lipsync(
        &self,
        request: LipSyncRequest,
        progress: StageProgress,
    ) -> Result<LipSyncedVideo, StageError> {
        self.calls.write().await.push(request.clone());

        progress.report(0.0, "Running lip sync...");
        self.behavior.delay().await;

        if let Some(error) = self.behavior.take_error().await {
            return Err(error);
        }

        let audio = tokio::fs::read_to_string(&request.audio).await?;
        let body = format!(
            "mock-mp4 job={} hd={} audio=[{}]",
            request.job_id, request.use_high_quality, audio
        );
        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&request.output, body.as_bytes()).await?;
        progress.report(1.0, "Lip sync complete");

        Ok(LipSyncedVideo {
            path: request.output,
            size_bytes: body.len() as u64,
        })
    }

    async fn health(&self) -> ServiceHealth {
        self.behavior.health().await
    }
}
