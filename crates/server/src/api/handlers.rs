use axum::{extract::State, http::header, response::IntoResponse, Json};
use dubbing_core::{check_services, AggregateHealth, OrchestratorStatus, SanitizedConfig};
use serde::Serialize;
use std::sync::Arc;

use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

/// Error response shared by every API handler.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Aggregate health of the three stage services.
///
/// Always 200; a degraded service shows up in the body, it does not gate the gateway.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<AggregateHealth> {
    let stages = state.stages();
    Json(
        check_services(
            stages.transcriber.as_ref(),
            stages.synthesizer.as_ref(),
            stages.lipsyncer.as_ref(),
        )
        .await,
    )
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

pub async fn orchestrator_status(State(state): State<Arc<AppState>>) -> Json<OrchestratorStatus> {
    Json(state.orchestrator().status().await)
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state).await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
