use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::{handlers, jobs, media, middleware::metrics_middleware, ws};
use crate::state::AppState;

/// Multipart framing on top of the configured file limit.
const UPLOAD_OVERHEAD_BYTES: u64 = 1024 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit =
        usize::try_from(state.max_upload_bytes().saturating_add(UPLOAD_OVERHEAD_BYTES))
            .unwrap_or(usize::MAX);
    let cors_permissive = state.config().server.cors_permissive;

    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/orchestrator/status", get(handlers::orchestrator_status))
        // Jobs
        .route(
            "/upload",
            post(jobs::upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/{id}", get(jobs::get_job).delete(jobs::delete_job))
        // Media
        .route("/preview/{id}", get(media::preview))
        .route("/download/{id}", get(media::download));

    let mut app = Router::new()
        .nest("/api", api_routes)
        .route("/ws/progress/{id}", get(ws::progress_ws))
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http());

    if cors_permissive {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app.with_state(state)
}
