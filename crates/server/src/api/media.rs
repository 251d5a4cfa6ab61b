//! Input preview and output download.

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use dubbing_core::JobStatus;
use std::sync::Arc;
use tower_http::services::ServeFile;

use super::handlers::ErrorResponse;
use super::jobs::{from_job_error, ApiError};
use crate::state::AppState;

/// Serve a file, honoring `Range` headers from the original request.
async fn serve_file(path: std::path::PathBuf, request: Request<Body>) -> Result<Response, ApiError> {
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("File not found")),
        ));
    }

    match ServeFile::new(path).try_call(request).await {
        Ok(response) => Ok(response.into_response()),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(format!("Failed to serve file: {}", e))),
        )),
    }
}

/// Stream the uploaded input video.
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    request: Request<Body>,
) -> Result<Response, ApiError> {
    let job = state.job_store().get(&id).map_err(from_job_error)?;
    serve_file(job.input_artifact, request).await
}

/// Download the dubbed video. Only available once the job completed.
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    request: Request<Body>,
) -> Result<Response, ApiError> {
    let job = state.job_store().get(&id).map_err(from_job_error)?;

    let output = match (job.status, job.output_artifact) {
        (JobStatus::Completed, Some(output)) => output,
        (status, _) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(format!(
                    "Job is {}, not yet completed",
                    status
                ))),
            ))
        }
    };

    let mut response = serve_file(output, request).await?;
    let disposition = format!("attachment; filename=\"dubbed_{}.mp4\"", id);
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("video/mp4"),
    );
    Ok(response)
}
