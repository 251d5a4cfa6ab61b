//! Types for the pipeline orchestrator.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifacts::ArtifactError;
use crate::job::JobError;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Job not found.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// The job already has an active pipeline run.
    #[error("job {0} is already running")]
    AlreadyRunning(String),

    /// Only queued jobs can be submitted.
    #[error("job {job_id} cannot be submitted from status {status}")]
    NotQueued { job_id: String, status: String },

    /// The orchestrator is stopped.
    #[error("orchestrator is not running")]
    NotRunning,

    /// Job store error.
    #[error("job store error: {0}")]
    Store(JobError),

    /// Artifact storage error.
    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),
}

impl From<JobError> for OrchestratorError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::NotFound(id) => OrchestratorError::JobNotFound(id),
            other => OrchestratorError::Store(other),
        }
    }
}

/// A finished upload waiting to become a job.
#[derive(Debug, Clone)]
pub struct NewUpload {
    /// Original filename as sent by the client.
    pub filename: String,
    /// Temporary location of the uploaded bytes.
    pub staged_path: PathBuf,
    pub size_bytes: u64,
    pub use_high_quality: bool,
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrchestratorStatus {
    /// Whether the orchestrator accepts new jobs.
    pub running: bool,
    /// Jobs with a live pipeline task (including ones waiting for a slot).
    pub active_jobs: usize,
    /// Concurrency limit (0 = unlimited).
    pub max_concurrent: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}
