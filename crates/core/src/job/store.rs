//! Job storage trait and types.

use std::path::PathBuf;

use thiserror::Error;

use super::state::JobTransition;
use super::types::{Job, JobStatus};

/// Error type for job operations.
#[derive(Debug, Error)]
pub enum JobError {
    /// Job not found.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// The requested transition is not legal from the job's current state.
    #[error("Cannot apply {transition} to job {job_id}: current state is {from}")]
    InvalidTransition {
        job_id: String,
        from: String,
        transition: &'static str,
    },

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Request to create a new job.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    /// Original name of the uploaded file.
    pub filename: String,
    /// Size of the upload in bytes.
    pub size_bytes: u64,
    /// Use the higher-quality lip-sync model.
    pub use_high_quality: bool,
    /// Where the uploaded video is stored.
    pub input_artifact: PathBuf,
}

/// Trait for job storage backends.
///
/// Implementations must be safe under concurrent callers and must make
/// [`JobStore::update`] atomic per job id.
pub trait JobStore: Send + Sync {
    /// Create a new job in the `queued` state with a fresh id.
    fn create(&self, request: CreateJobRequest) -> Result<Job, JobError>;

    /// Get a job by ID.
    fn get(&self, id: &str) -> Result<Job, JobError>;

    /// List all jobs, most recently created first.
    fn list(&self) -> Result<Vec<Job>, JobError>;

    /// Atomically read-modify-write a job.
    ///
    /// The mutator sees a working copy; if it returns an error nothing is
    /// committed. On success the revision is bumped and the new job returned.
    fn update(
        &self,
        id: &str,
        mutator: &mut dyn FnMut(&mut Job) -> Result<(), JobError>,
    ) -> Result<Job, JobError>;

    /// Remove a job record. Returns the removed job.
    fn delete(&self, id: &str) -> Result<Job, JobError>;

    /// Count jobs, optionally restricted to one status.
    fn count(&self, status: Option<JobStatus>) -> Result<usize, JobError> {
        let jobs = self.list()?;
        Ok(match status {
            Some(status) => jobs.iter().filter(|j| j.status == status).count(),
            None => jobs.len(),
        })
    }

    /// Apply a state-machine transition through [`JobStore::update`].
    fn transition(&self, id: &str, transition: &JobTransition) -> Result<Job, JobError> {
        self.update(id, &mut |job| job.apply(transition))
    }
}
