//! Transcription + translation service client.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::multipart::Form;
use serde::Deserialize;
use tracing::{debug, info};

use super::error::StageError;
use super::health::ServiceHealth;
use super::http::{file_part, ServiceClient};
use super::traits::{StageProgress, Transcriber};
use super::types::{Transcription, TranscriptionRequest};
use crate::job::Segment;

/// Body returned by `POST /translate`.
#[derive(Debug, Deserialize)]
struct TranslateResponse {
    segments: Option<Vec<Segment>>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    reference_audio_path: Option<String>,
}

/// [`Transcriber`] backed by the ASR HTTP service.
pub struct HttpTranscriber {
    client: ServiceClient,
}

impl HttpTranscriber {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    /// Turn the raw response body into a validated transcription.
    async fn parse(body: &str) -> Result<Transcription, StageError> {
        let response: TranslateResponse = serde_json::from_str(body)
            .map_err(|e| StageError::malformed(format!("invalid transcription JSON: {}", e)))?;

        let segments = response
            .segments
            .ok_or_else(|| StageError::malformed("transcription has no segments field"))?;
        if segments.is_empty() {
            return Err(StageError::malformed("transcription returned no segments"));
        }

        // The service may run on another host; its path is only useful if we can read it.
        let reference_audio = match response.reference_audio_path {
            Some(path) => {
                let path = PathBuf::from(path);
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    Some(path)
                } else {
                    debug!("Reference audio {} not accessible locally", path.display());
                    None
                }
            }
            None => None,
        };

        Ok(Transcription {
            segments,
            text: response.text.unwrap_or_default(),
            reference_audio,
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(
        &self,
        request: TranscriptionRequest,
        progress: StageProgress,
    ) -> Result<Transcription, StageError> {
        progress.report(0.0, "Uploading video for transcription...");

        let input = &request.input;
        let language = &request.source_language;
        let body = self
            .client
            .post_for_text("/translate", move || async move {
                Ok(Form::new()
                    .part("file", file_part(input, "application/octet-stream").await?)
                    .text("language", language.clone())
                    .text("save_audio", "true"))
            })
            .await?;

        let transcription = Self::parse(&body).await?;
        info!(
            job_id = %request.job_id,
            "Transcribed {} segments",
            transcription.segments.len()
        );
        progress.report(1.0, "Transcription complete");

        Ok(transcription)
    }

    async fn health(&self) -> ServiceHealth {
        self.client.health().await
    }
}
