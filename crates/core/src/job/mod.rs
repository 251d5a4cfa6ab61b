//! Job records: the data model, the stage state machine, and storage.
//!
//! A [`Job`] only changes through [`Job::apply`], which is the single place
//! where status/stage transitions are validated. Stores serialize updates
//! per job id so two read-modify-write cycles never interleave.

mod memory_store;
mod state;
mod store;
mod types;

pub use memory_store::InMemoryJobStore;
pub use state::JobTransition;
pub use store::{CreateJobRequest, JobError, JobStore};
pub use types::{Job, JobStatus, Segment, Stage};
