//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Orchestrator (job lifecycle, concurrency)
//! - Stage services (calls, durations, retries)
//! - Progress fan-out (events published, lagged subscribers)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Orchestrator - Job Metrics
// =============================================================================

/// Jobs accepted for processing.
pub static JOBS_SUBMITTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("dubber_jobs_submitted_total", "Total jobs submitted").unwrap()
});

/// Jobs that reached a terminal state, by outcome.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dubber_jobs_finished_total", "Total jobs that finished"),
        &["outcome"], // "completed", "failed", "cancelled"
    )
    .unwrap()
});

/// End-to-end job duration in seconds.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("dubber_job_duration_seconds", "Duration of pipeline runs").buckets(
            vec![10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0],
        ),
        &["outcome"],
    )
    .unwrap()
});

/// Pipeline runs currently holding a concurrency slot.
pub static JOBS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("dubber_jobs_running", "Pipeline runs currently executing").unwrap()
});

// =============================================================================
// Stage Services
// =============================================================================

/// Stage calls by stage and result.
pub static STAGE_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dubber_stage_calls_total", "Total stage service calls"),
        &["stage", "result"], // result: "success" or a StageError kind
    )
    .unwrap()
});

/// Stage call duration in seconds (including retries).
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("dubber_stage_duration_seconds", "Duration of stage calls").buckets(
            vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0],
        ),
        &["stage"],
    )
    .unwrap()
});

/// Retries issued after transient stage failures.
pub static STAGE_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dubber_stage_retries_total", "Total stage call retries"),
        &["stage"],
    )
    .unwrap()
});

// =============================================================================
// Progress Fan-out
// =============================================================================

/// Progress events published to subscribers.
pub static PROGRESS_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "dubber_progress_events_total",
        "Total progress events published",
    )
    .unwrap()
});

/// Events skipped by subscribers that fell behind.
pub static PROGRESS_EVENTS_LAGGED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "dubber_progress_events_lagged_total",
        "Progress events dropped for slow subscribers",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Jobs
        Box::new(JOBS_SUBMITTED.clone()),
        Box::new(JOBS_FINISHED.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(JOBS_RUNNING.clone()),
        // Stages
        Box::new(STAGE_CALLS.clone()),
        Box::new(STAGE_DURATION.clone()),
        Box::new(STAGE_RETRIES.clone()),
        // Progress
        Box::new(PROGRESS_EVENTS.clone()),
        Box::new(PROGRESS_EVENTS_LAGGED.clone()),
    ]
}
