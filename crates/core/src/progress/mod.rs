//! Per-job progress fan-out.
//!
//! The orchestrator publishes a [`ProgressEvent`] after every committed job
//! update. Subscribers first receive the job's current snapshot, then live
//! events newer than that snapshot, until the job reaches a terminal state.

mod broadcaster;
mod event;

pub use broadcaster::{ProgressBroadcaster, ProgressSubscription};
pub use event::ProgressEvent;
