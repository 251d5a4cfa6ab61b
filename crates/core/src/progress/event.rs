use serde::{Deserialize, Serialize};

use crate::job::{Job, JobStatus, Stage};

/// A progress update for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: String,
    /// The job revision this event reflects. Strictly increasing per job.
    pub seq: u64,
    pub status: JobStatus,
    pub stage: Option<Stage>,
    pub progress: u8,
    pub message: String,
}

impl ProgressEvent {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            seq: job.revision,
            status: job.status,
            stage: job.current_stage,
            progress: job.progress_percent,
            message: job.message.clone(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
