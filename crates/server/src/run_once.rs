//! Dub a single local video from the command line.
//!
//! The video goes through the same orchestrator as an upload: it is copied
//! into the staging area, run as a job, and the finished output is copied to
//! the requested path. The job and its working files are removed afterwards.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use dubbing_core::{check_services, AggregateHealth, JobStatus, NewUpload};
use tracing::{error, info, warn};

use crate::Pipeline;

/// Arguments of `dubber run`.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub use_high_quality: bool,
    pub skip_health: bool,
}

/// Run one video through the pipeline. Returns the written output path.
///
/// `interrupt` resolving aborts the run and cleans up the job.
pub async fn run_once(
    pipeline: &Pipeline,
    request: RunRequest,
    interrupt: impl Future<Output = ()>,
) -> Result<PathBuf> {
    if !tokio::fs::try_exists(&request.input).await.unwrap_or(false) {
        bail!("Input video not found: {}", request.input.display());
    }

    let mode = if request.use_high_quality { "hd" } else { "standard" };
    info!(
        input = %request.input.display(),
        output = %request.output.display(),
        mode,
        "Dubbing video"
    );

    if !request.skip_health {
        info!("Checking service health...");
        let stages = &pipeline.stages;
        let health = check_services(
            stages.transcriber.as_ref(),
            stages.synthesizer.as_ref(),
            stages.lipsyncer.as_ref(),
        )
        .await;
        report_health(&health);
        if health.status != "ok" {
            bail!("One or more services are not reachable");
        }
    }

    let started = Instant::now();
    let filename = request
        .input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input.mp4".to_string());
    let (staged_path, size_bytes) = pipeline
        .artifacts
        .stage_copy(&request.input)
        .await
        .with_context(|| format!("Failed to read {}", request.input.display()))?;

    let job = match pipeline
        .orchestrator
        .create_job(NewUpload {
            filename,
            staged_path: staged_path.clone(),
            size_bytes,
            use_high_quality: request.use_high_quality,
        })
        .await
    {
        Ok(job) => job,
        Err(e) => {
            if let Err(remove) = tokio::fs::remove_file(&staged_path).await {
                if remove.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", staged_path.display(), remove);
                }
            }
            return Err(e).context("Failed to start pipeline");
        }
    };

    let mut subscription = pipeline.broadcaster.subscribe(&job.id)?;
    let watch = async {
        while let Some(event) = subscription.next().await {
            info!(
                stage = event.stage.map(|stage| stage.as_str()).unwrap_or("queued"),
                progress = event.progress,
                "{}",
                event.message
            );
        }
    };

    let interrupted = tokio::select! {
        _ = watch => false,
        _ = interrupt => true,
    };
    if interrupted {
        warn!(job_id = %job.id, "Interrupted, cancelling pipeline");
        pipeline.orchestrator.delete_job(&job.id).await.ok();
        bail!("Interrupted");
    }

    let job = pipeline.store.get(&job.id)?;
    let result = match (job.status, &job.output_artifact) {
        (JobStatus::Completed, Some(artifact)) => copy_output(artifact, &request.output).await,
        _ => Err(anyhow::anyhow!(
            "Pipeline failed: {}",
            job.error_reason.as_deref().unwrap_or("unknown error")
        )),
    };

    // The job only exists for this run.
    if let Err(e) = pipeline.orchestrator.delete_job(&job.id).await {
        warn!(job_id = %job.id, "Failed to clean up job: {}", e);
    }

    let output = result?;
    info!(
        duration_secs = started.elapsed().as_secs_f64(),
        output = %output.display(),
        segments = job.segments.len(),
        "Pipeline complete"
    );
    Ok(output)
}

fn report_health(health: &AggregateHealth) {
    for (service, state) in &health.services {
        if state.is_healthy() {
            info!(service = %service, "Service reachable");
        } else {
            error!(
                service = %service,
                error = state.error.as_deref().unwrap_or("unknown"),
                "Service not reachable"
            );
        }
    }

    let checkpoint_ready = health
        .services
        .get("lipsync")
        .and_then(|state| state.details.as_ref())
        .and_then(|details| details.get("checkpoint_ready"))
        .and_then(|ready| ready.as_bool());
    if checkpoint_ready == Some(false) {
        warn!("Lip-sync service reports no model checkpoint loaded");
    }
}

async fn copy_output(artifact: &Path, output: &Path) -> Result<PathBuf> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::copy(artifact, output)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(output.to_path_buf())
}
