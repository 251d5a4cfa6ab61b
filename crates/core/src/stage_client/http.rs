//! Shared HTTP plumbing for the stage services.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::error::StageError;
use super::health::ServiceHealth;
use super::retry::{with_retry, RetryPolicy};
use crate::config::{ServiceEndpoint, ServicesConfig};

/// HTTP connection to one stage service.
///
/// Owns the connection pool, the stage timeout and the retry policy. The
/// stage-specific clients build multipart forms and interpret responses.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    stage: &'static str,
    base_url: String,
    client: Client,
    timeout_secs: u64,
    health_timeout: Duration,
    retry: RetryPolicy,
}

impl ServiceClient {
    pub fn new(
        stage: &'static str,
        endpoint: &ServiceEndpoint,
        services: &ServicesConfig,
        retry: RetryPolicy,
    ) -> Result<Self, StageError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(services.connect_timeout_secs))
            .build()
            .map_err(|e| StageError::Connection(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            stage,
            base_url: endpoint.url.trim_end_matches('/').to_string(),
            client,
            timeout_secs: endpoint.timeout_secs,
            health_timeout: Duration::from_secs(services.health_timeout_secs),
            retry,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a multipart form and return the response body as text.
    ///
    /// `build` is called once per attempt since forms cannot be replayed.
    pub async fn post_for_text<B, Fut>(&self, path: &str, build: B) -> Result<String, StageError>
    where
        B: Fn() -> Fut,
        Fut: Future<Output = Result<Form, StageError>>,
    {
        let build = &build;
        with_retry(&self.retry, self.stage, move |attempt| async move {
            let response = self.send(path, build().await?, attempt).await?;
            response.text().await.map_err(|e| self.classify(e))
        })
        .await
    }

    /// POST a multipart form and stream the response body into `dest`.
    ///
    /// Returns the number of bytes written. A partial file from a failed
    /// attempt is overwritten by the next one.
    pub async fn post_for_file<B, Fut>(
        &self,
        path: &str,
        build: B,
        dest: &Path,
    ) -> Result<u64, StageError>
    where
        B: Fn() -> Fut,
        Fut: Future<Output = Result<Form, StageError>>,
    {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let build = &build;
        with_retry(&self.retry, self.stage, move |attempt| async move {
            let mut response = self.send(path, build().await?, attempt).await?;
            let mut file = tokio::fs::File::create(dest).await?;
            let mut written = 0u64;
            while let Some(chunk) = response.chunk().await.map_err(|e| self.classify(e))? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            Ok(written)
        })
        .await
    }

    async fn send(&self, path: &str, form: Form, attempt: u32) -> Result<Response, StageError> {
        let url = self.url(path);
        debug!(stage = self.stage, attempt, "POST {}", url);

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(self.timeout_secs))
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: String = response
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(500)
            .collect();

        if status.is_server_error() || status.as_u16() == 429 {
            Err(StageError::ServerError {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(StageError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }

    fn classify(&self, e: reqwest::Error) -> StageError {
        if e.is_timeout() {
            StageError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else if e.is_decode() {
            StageError::MalformedResponse(e.to_string())
        } else {
            // Connect, body and protocol errors are all worth another attempt.
            StageError::Connection(e.to_string())
        }
    }

    /// Probe `GET /health`.
    pub async fn health(&self) -> ServiceHealth {
        let result = self
            .client
            .get(self.url("/health"))
            .timeout(self.health_timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                let details = response.json::<serde_json::Value>().await.ok();
                ServiceHealth::healthy(details)
            }
            Ok(response) => ServiceHealth::unhealthy(format!("HTTP {}", response.status())),
            Err(e) => ServiceHealth::unreachable(e.to_string()),
        }
    }
}

/// Multipart part streamed from a local file.
pub(crate) async fn file_part(path: &Path, mime: &str) -> Result<Part, StageError> {
    let file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    Part::stream_with_length(file, len)
        .file_name(file_name)
        .mime_str(mime)
        .map_err(|e| StageError::Connection(e.to_string()))
}
