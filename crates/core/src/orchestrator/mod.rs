//! Pipeline orchestrator.
//!
//! Drives each job through transcription, synthesis and lip sync on its own
//! task. Runs are bounded by a worker limit, cancellable per job, and every
//! committed state change is published to progress subscribers.

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::{JobUpdateCallback, PipelineOrchestrator, StageClients};
pub use types::{NewUpload, OrchestratorError, OrchestratorStatus};
