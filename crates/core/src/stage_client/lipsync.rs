//! Lip synchronization service client.

use async_trait::async_trait;
use reqwest::multipart::Form;
use tracing::info;

use super::error::StageError;
use super::health::ServiceHealth;
use super::http::{file_part, ServiceClient};
use super::traits::{LipSyncer, StageProgress};
use super::types::{LipSyncRequest, LipSyncedVideo};

/// [`LipSyncer`] backed by the Wav2Lip HTTP service.
pub struct HttpLipSyncer {
    client: ServiceClient,
    resize_factor: u32,
    pads: String,
}

impl HttpLipSyncer {
    pub fn new(client: ServiceClient, resize_factor: u32, pads: impl Into<String>) -> Self {
        Self {
            client,
            resize_factor,
            pads: pads.into(),
        }
    }
}

#[async_trait]
impl LipSyncer for HttpLipSyncer {
    async fn lipsync(
        &self,
        request: LipSyncRequest,
        progress: StageProgress,
    ) -> Result<LipSyncedVideo, StageError> {
        let message = if request.use_high_quality {
            "Running HD lip sync (this may take a while)..."
        } else {
            "Running lip sync..."
        };
        progress.report(0.0, message);

        let (video, audio) = (&request.video, &request.audio);
        let use_hd = request.use_high_quality;
        let size_bytes = self
            .client
            .post_for_file(
                "/lipsync",
                move || async move {
                    Ok(Form::new()
                        .part("video", file_part(video, "video/mp4").await?)
                        .part("audio", file_part(audio, "audio/wav").await?)
                        .text("use_hd", use_hd.to_string())
                        .text("resize_factor", self.resize_factor.to_string())
                        .text("pads", self.pads.clone()))
                },
                &request.output,
            )
            .await?;

        if size_bytes == 0 {
            let _ = tokio::fs::remove_file(&request.output).await;
            return Err(StageError::malformed("lip sync returned an empty video"));
        }

        info!(job_id = %request.job_id, "Lip sync produced {} bytes", size_bytes);
        progress.report(1.0, "Lip sync complete");

        Ok(LipSyncedVideo {
            path: request.output,
            size_bytes,
        })
    }

    async fn health(&self) -> ServiceHealth {
        self.client.health().await
    }
}
