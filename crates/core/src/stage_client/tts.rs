//! Voice-cloned speech synthesis service client.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use reqwest::multipart::Form;
use tokio::process::Command;
use tracing::{debug, info};

use super::error::StageError;
use super::health::ServiceHealth;
use super::http::{file_part, ServiceClient};
use super::traits::{StageProgress, Synthesizer};
use super::types::{SynthesisRequest, SynthesizedAudio, VoiceReference};

/// Length of the voice sample cut from the input when no reference is supplied.
const REFERENCE_CLIP_SECS: u32 = 30;

/// [`Synthesizer`] backed by the TTS HTTP service.
pub struct HttpSynthesizer {
    client: ServiceClient,
    ffmpeg_path: PathBuf,
}

impl HttpSynthesizer {
    pub fn new(client: ServiceClient, ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            client,
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Resolve the voice reference to a WAV file on disk.
    async fn reference_audio(&self, request: &SynthesisRequest) -> Result<PathBuf, StageError> {
        match &request.voice {
            VoiceReference::Audio(path) => Ok(path.clone()),
            VoiceReference::ExtractFrom(video) => {
                let dest = request.output.with_file_name("voice_reference.wav");
                if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
                    return Ok(dest);
                }
                self.extract_reference(video, &dest).await?;
                Ok(dest)
            }
        }
    }

    /// Cut a mono 22.05 kHz sample from the start of `video`.
    async fn extract_reference(&self, video: &Path, dest: &Path) -> Result<(), StageError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!("Extracting voice reference from {}", video.display());

        let output = Command::new(&self.ffmpeg_path)
            .arg("-y")
            .arg("-i")
            .arg(video)
            .args(["-t", &REFERENCE_CLIP_SECS.to_string()])
            .args(["-vn", "-ar", "22050", "-ac", "1"])
            .arg(dest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                StageError::ReferenceAudio(format!(
                    "failed to run {}: {}",
                    self.ffmpeg_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr.lines().rev().take(3).collect::<Vec<_>>().join(" | ");
            return Err(StageError::ReferenceAudio(format!(
                "ffmpeg exited with {}: {}",
                output.status, tail
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(
        &self,
        request: SynthesisRequest,
        progress: StageProgress,
    ) -> Result<SynthesizedAudio, StageError> {
        progress.report(0.0, "Preparing voice reference...");
        let reference = self.reference_audio(&request).await?;

        let segments = serde_json::to_string(&request.segments)
            .map_err(|e| StageError::malformed(format!("failed to encode segments: {}", e)))?;

        progress.report(0.1, "Synthesizing dubbed audio...");
        let reference = &reference;
        let segments = &segments;
        let size_bytes = self
            .client
            .post_for_file(
                "/synthesize_segments",
                move || async move {
                    Ok(Form::new()
                        .part("reference_audio", file_part(reference, "audio/wav").await?)
                        .text("segments", segments.clone()))
                },
                &request.output,
            )
            .await?;

        if size_bytes == 0 {
            let _ = tokio::fs::remove_file(&request.output).await;
            return Err(StageError::malformed("synthesis returned empty audio"));
        }

        info!(
            job_id = %request.job_id,
            "Synthesized {} segments ({} bytes)",
            request.segments.len(),
            size_bytes
        );
        progress.report(1.0, "Audio synthesis complete");

        Ok(SynthesizedAudio {
            path: request.output,
            size_bytes,
        })
    }

    async fn health(&self) -> ServiceHealth {
        self.client.health().await
    }
}
