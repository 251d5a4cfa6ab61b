//! Error types for stage clients.

use thiserror::Error;

/// Errors returned by a stage client call.
///
/// Transient errors are retried inside the client; everything that reaches
/// the orchestrator terminates the job.
#[derive(Debug, Error)]
pub enum StageError {
    /// Could not reach the service.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The request did not finish within the stage timeout.
    #[error("timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The service answered with a 5xx (or 429) status.
    #[error("service error HTTP {status}: {body}")]
    ServerError { status: u16, body: String },

    /// The service rejected the request (4xx). Never retried.
    #[error("request rejected HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The response was missing required fields or could not be parsed.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Transient failures persisted through every attempt.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<StageError>,
    },

    /// The voice reference could not be prepared locally.
    #[error("voice reference unavailable: {0}")]
    ReferenceAudio(String),

    /// Local filesystem error while preparing or storing artifacts.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The call was abandoned because the job was cancelled.
    #[error("cancelled")]
    Cancelled,
}

impl StageError {
    /// Whether this error may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout { .. } | Self::ServerError { .. }
        )
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Timeout { .. } => "timeout",
            Self::ServerError { .. } => "server_error",
            Self::Rejected { .. } => "rejected",
            Self::MalformedResponse(_) => "malformed",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::ReferenceAudio(_) => "reference_audio",
            Self::Io(_) => "io",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedResponse(reason.into())
    }
}
