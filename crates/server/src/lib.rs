//! Gateway API for the dubbing pipeline.
//!
//! The binary (`dubber`) wires configuration, stage clients and the
//! orchestrator together; this library exposes the router so it can be
//! exercised in-process by tests.

pub mod api;
pub mod metrics;
pub mod state;

pub use api::create_router;
pub use state::AppState;
