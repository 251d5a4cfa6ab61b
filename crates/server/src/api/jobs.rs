//! Job API handlers.

use axum::{
    extract::{multipart::Field, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use dubbing_core::{ArtifactError, Job, JobError, NewUpload, OrchestratorError, Segment};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use super::handlers::ErrorResponse;
use crate::metrics::UPLOAD_BYTES_TOTAL;
use crate::state::AppState;

/// Filename used when the client sends none.
const DEFAULT_FILENAME: &str = "upload.mp4";

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse::new(error)))
}

pub(crate) fn job_not_found(id: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, format!("Job not found: {}", id))
}

pub(crate) fn from_job_error(e: JobError) -> ApiError {
    match e {
        JobError::NotFound(id) => job_not_found(&id),
        other => api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

fn from_orchestrator_error(e: OrchestratorError) -> ApiError {
    match e {
        OrchestratorError::JobNotFound(id) => job_not_found(&id),
        OrchestratorError::NotRunning => api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
        other => api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

fn from_artifact_error(e: ArtifactError) -> ApiError {
    match e {
        ArtifactError::TooLarge { .. } => api_error(StatusCode::PAYLOAD_TOO_LARGE, e.to_string()),
        ArtifactError::Empty => api_error(StatusCode::BAD_REQUEST, e.to_string()),
        ArtifactError::Io(_) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Wire form of a job.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub job_id: String,
    pub filename: String,
    pub file_size_mb: f64,
    pub status: String,
    /// `None` while the job is still queued.
    pub current_step: Option<String>,
    pub progress: u8,
    pub message: String,
    pub use_hd: bool,
    pub segments: Vec<Segment>,
    /// Full translated text, empty until transcription finishes.
    pub transcript: String,
    pub error: Option<String>,
    pub has_output: bool,
    pub created_at: String,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            file_size_mb: job.size_mb(),
            job_id: job.id,
            filename: job.filename,
            status: job.status.to_string(),
            current_step: job.current_stage.map(|stage| stage.to_string()),
            progress: job.progress_percent,
            message: job.message,
            use_hd: job.use_high_quality,
            segments: job.segments,
            transcript: job.transcript,
            error: job.error_reason,
            has_output: job.output_artifact.is_some(),
            created_at: job.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub job_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobResponse>,
}

#[derive(Debug, Serialize)]
pub struct DeleteJobResponse {
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Accept a video upload and start its pipeline.
///
/// Multipart fields: `file` (required) and `use_hd` (optional boolean).
/// The file is streamed to disk chunk by chunk.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut file: Option<(String, PathBuf, u64)> = None;
    let mut use_hd = false;

    let result = read_upload_form(&state, &mut multipart, &mut file, &mut use_hd).await;
    let (filename, staged_path, size_bytes) = match (result, file) {
        (Ok(()), Some(file)) => file,
        (Ok(()), None) => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "Missing multipart field 'file'",
            ))
        }
        (Err(e), staged) => {
            if let Some((_, path, _)) = staged {
                discard(&path).await;
            }
            return Err(e);
        }
    };

    let job = match state
        .orchestrator()
        .create_job(NewUpload {
            filename,
            staged_path: staged_path.clone(),
            size_bytes,
            use_high_quality: use_hd,
        })
        .await
    {
        Ok(job) => job,
        Err(e) => {
            discard(&staged_path).await;
            return Err(from_orchestrator_error(e));
        }
    };

    UPLOAD_BYTES_TOTAL.inc_by(size_bytes);

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: format!(
                "Video '{}' uploaded ({:.1} MB). Pipeline started.",
                job.filename,
                size_bytes as f64 / (1024.0 * 1024.0)
            ),
            job_id: job.id,
            status: job.status.to_string(),
        }),
    ))
}

async fn read_upload_form(
    state: &AppState,
    multipart: &mut Multipart,
    file: &mut Option<(String, PathBuf, u64)>,
    use_hd: &mut bool,
) -> Result<(), ApiError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(()),
            Err(e) => {
                return Err(api_error(
                    StatusCode::BAD_REQUEST,
                    format!("Invalid multipart body: {}", e),
                ))
            }
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                if file.is_some() {
                    return Err(api_error(
                        StatusCode::BAD_REQUEST,
                        "Only one 'file' field is allowed",
                    ));
                }
                let filename = field
                    .file_name()
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or(DEFAULT_FILENAME)
                    .to_string();
                let (path, size) = stage_file(state, field).await?;
                *file = Some((filename, path, size));
            }
            "use_hd" => {
                let text = field.text().await.map_err(|e| {
                    api_error(
                        StatusCode::BAD_REQUEST,
                        format!("Failed to read 'use_hd': {}", e),
                    )
                })?;
                *use_hd = parse_flag(&text).ok_or_else(|| {
                    api_error(
                        StatusCode::BAD_REQUEST,
                        format!("Invalid boolean for 'use_hd': {}", text),
                    )
                })?;
            }
            other => {
                warn!(field = other, "Ignoring unknown upload field");
            }
        }
    }
}

/// Stream one multipart field into a staged upload.
async fn stage_file(state: &AppState, mut field: Field<'_>) -> Result<(PathBuf, u64), ApiError> {
    let mut staged = state
        .artifacts()
        .begin_upload(state.max_upload_bytes())
        .await
        .map_err(from_artifact_error)?;

    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                if let Err(e) = staged.write_chunk(&chunk).await {
                    staged.abort().await;
                    return Err(from_artifact_error(e));
                }
            }
            Ok(None) => break,
            Err(e) => {
                staged.abort().await;
                return Err(api_error(
                    StatusCode::BAD_REQUEST,
                    format!("Failed to read file: {}", e),
                ));
            }
        }
    }

    staged.finish().await.map_err(from_artifact_error)
}

async fn discard(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove staged upload");
        }
    }
}

/// HTML-form style booleans.
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" | "" => Some(false),
        _ => None,
    }
}

/// List all jobs, most recent first.
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let jobs = state.job_store().list().map_err(from_job_error)?;
    Ok(Json(ListJobsResponse {
        jobs: jobs.into_iter().map(JobResponse::from).collect(),
    }))
}

/// Get a job by ID
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = state.job_store().get(&id).map_err(from_job_error)?;
    Ok(Json(JobResponse::from(job)))
}

/// Delete a job: stops its pipeline and removes its files.
pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteJobResponse>, ApiError> {
    state
        .orchestrator()
        .delete_job(&id)
        .await
        .map_err(from_orchestrator_error)?;

    info!(job_id = %id, "Job deleted via API");
    Ok(Json(DeleteJobResponse {
        message: format!("Job {} deleted", id),
    }))
}
