//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the dubbing gateway:
//! - HTTP request metrics (latency, counts)
//! - WebSocket progress stream metrics
//! - Orchestrator and job status (collected dynamically)
//!
//! Pipeline metrics (stage calls, retries, job outcomes) live in
//! `dubbing_core::metrics` and are registered here as well.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};

use dubbing_core::JobStatus;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "dubber_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 60.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dubber_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "dubber_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Bytes accepted through the upload endpoint.
pub static UPLOAD_BYTES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "dubber_upload_bytes_total",
        "Total bytes of video accepted through uploads",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Open progress streams.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "dubber_ws_connections_active",
        "Number of open WebSocket progress streams",
    )
    .unwrap()
});

/// Progress streams opened since startup.
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "dubber_ws_connections_total",
        "Total WebSocket progress streams opened",
    )
    .unwrap()
});

/// Progress events written to WebSocket clients, by job status.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dubber_ws_messages_sent_total", "WebSocket messages sent"),
        &["status"],
    )
    .unwrap()
});

// =============================================================================
// Orchestrator Metrics
// =============================================================================

/// Whether the orchestrator accepts jobs (1) or not (0).
pub static ORCHESTRATOR_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "dubber_orchestrator_running",
        "Whether the pipeline orchestrator is running",
    )
    .unwrap()
});

/// Jobs with a live pipeline task.
pub static ORCHESTRATOR_ACTIVE_JOBS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "dubber_orchestrator_active_jobs",
        "Jobs with a live pipeline task, including ones waiting for a slot",
    )
    .unwrap()
});

/// Stored jobs by status.
pub static JOBS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("dubber_jobs_by_status", "Stored jobs by status"),
        &["status"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry
        .register(Box::new(UPLOAD_BYTES_TOTAL.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();

    // Orchestrator
    registry
        .register(Box::new(ORCHESTRATOR_RUNNING.clone()))
        .unwrap();
    registry
        .register(Box::new(ORCHESTRATOR_ACTIVE_JOBS.clone()))
        .unwrap();
    registry.register(Box::new(JOBS_BY_STATUS.clone())).unwrap();

    // Core metrics (jobs, stage calls, progress fan-out)
    for metric in dubbing_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the orchestrator and store as
/// they are right now.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.orchestrator().status().await;
    ORCHESTRATOR_RUNNING.set(if status.running { 1 } else { 0 });
    ORCHESTRATOR_ACTIVE_JOBS.set(status.active_jobs as i64);

    let store = state.job_store();
    for job_status in JobStatus::ALL {
        if let Ok(count) = store.count(Some(job_status)) {
            JOBS_BY_STATUS
                .with_label_values(&[job_status.as_str()])
                .set(count as i64);
        }
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let uuid_regex = regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap();
    let numeric_regex = regex_lite::Regex::new(r"/\d+(/|$)").unwrap();

    let result = uuid_regex.replace_all(path, "{id}");
    let result = numeric_regex.replace_all(&result, "/{id}$1");
    result.to_string()
}
