//! Pipeline orchestrator implementation.
//!
//! Each submitted job gets its own task and cancellation token:
//! - Wait for a worker slot (the job stays queued meanwhile)
//! - asr -> tts -> lipsync, strictly in sequence
//! - Every committed update is published to progress subscribers
//!
//! The run task is the only writer of a job's terminal outcome.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::artifacts::ArtifactStore;
use crate::job::{CreateJobRequest, Job, JobError, JobStatus, JobStore, JobTransition, Stage};
use crate::metrics::{
    JOBS_FINISHED, JOBS_RUNNING, JOBS_SUBMITTED, JOB_DURATION, STAGE_CALLS, STAGE_DURATION,
};
use crate::progress::ProgressBroadcaster;
use crate::stage_client::{
    LipSyncRequest, LipSyncer, StageError, StageProgress, SynthesisRequest, Synthesizer,
    Transcriber, TranscriptionRequest, VoiceReference,
};

use super::config::OrchestratorConfig;
use super::types::{NewUpload, OrchestratorError, OrchestratorStatus};

/// Callback invoked with every committed job update.
pub type JobUpdateCallback = Arc<dyn Fn(&Job) + Send + Sync>;

/// The three stage services a pipeline run calls.
#[derive(Clone)]
pub struct StageClients {
    pub transcriber: Arc<dyn Transcriber>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub lipsyncer: Arc<dyn LipSyncer>,
}

/// A live pipeline task for one job.
struct ActiveRun {
    run_id: u64,
    token: CancellationToken,
    /// Cancelled when the task exits, panics included.
    done: CancellationToken,
    handle: JoinHandle<()>,
}

/// Why a run stopped before completing.
enum RunFailure {
    Stage { stage: Stage, error: StageError },
    Cancelled,
    Store(JobError),
}

impl From<JobError> for RunFailure {
    fn from(e: JobError) -> Self {
        RunFailure::Store(e)
    }
}

/// State shared between the orchestrator and its run tasks.
struct RunContext {
    store: Arc<dyn JobStore>,
    stages: StageClients,
    broadcaster: Arc<ProgressBroadcaster>,
    artifacts: ArtifactStore,
    source_language: String,
    on_update: Option<JobUpdateCallback>,
    active: Mutex<HashMap<String, ActiveRun>>,
}

/// Drives jobs through the dubbing pipeline.
pub struct PipelineOrchestrator {
    config: OrchestratorConfig,
    ctx: Arc<RunContext>,
    permits: Option<Arc<Semaphore>>,
    running: AtomicBool,
    next_run_id: AtomicU64,
}

impl PipelineOrchestrator {
    /// Create a new orchestrator. Call [`start`](Self::start) before submitting jobs.
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn JobStore>,
        stages: StageClients,
        broadcaster: Arc<ProgressBroadcaster>,
        artifacts: ArtifactStore,
        on_update: Option<JobUpdateCallback>,
    ) -> Self {
        let permits = match config.max_concurrent_jobs {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };

        let ctx = Arc::new(RunContext {
            store,
            stages,
            broadcaster,
            artifacts,
            source_language: config.source_language.clone(),
            on_update,
            active: Mutex::new(HashMap::new()),
        });

        Self {
            config,
            ctx,
            permits,
            running: AtomicBool::new(false),
            next_run_id: AtomicU64::new(1),
        }
    }

    /// Start accepting jobs.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return;
        }
        info!(
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            "Pipeline orchestrator started"
        );
    }

    /// Stop accepting jobs, cancel every active run and wait for them to exit.
    pub async fn stop(&self) {
        // Flipped under the registry lock so no submission can slip in after the drain.
        let runs: Vec<(String, ActiveRun)> = {
            let mut active = self.ctx.lock_active();
            if !self.running.swap(false, Ordering::SeqCst) {
                drop(active);
                warn!("Orchestrator not running");
                return;
            }
            active.drain().collect()
        };

        info!("Stopping pipeline orchestrator");

        for (_, run) in &runs {
            run.token.cancel();
        }
        for (job_id, run) in runs {
            if let Err(e) = run.handle.await {
                error!(job_id = %job_id, "Pipeline task panicked: {}", e);
            }
        }

        info!("Pipeline orchestrator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get current orchestrator status.
    pub async fn status(&self) -> OrchestratorStatus {
        let count = |status| self.ctx.store.count(Some(status)).unwrap_or(0);

        OrchestratorStatus {
            running: self.is_running(),
            active_jobs: self.ctx.lock_active().len(),
            max_concurrent: self.config.max_concurrent_jobs,
            queued: count(JobStatus::Queued),
            processing: count(JobStatus::Processing),
            completed: count(JobStatus::Completed),
            failed: count(JobStatus::Failed),
        }
    }

    /// Whether a pipeline task is live for the job.
    pub fn is_active(&self, job_id: &str) -> bool {
        self.ctx.lock_active().contains_key(job_id)
    }

    /// Register an upload as a new job and start its pipeline.
    ///
    /// The staged file is moved to the job's input location.
    pub async fn create_job(&self, upload: NewUpload) -> Result<Job, OrchestratorError> {
        if !self.is_running() {
            return Err(OrchestratorError::NotRunning);
        }

        let job = self.ctx.store.create(CreateJobRequest {
            filename: upload.filename.clone(),
            size_bytes: upload.size_bytes,
            use_high_quality: upload.use_high_quality,
            input_artifact: upload.staged_path.clone(),
        })?;

        let input = match self
            .ctx
            .artifacts
            .promote(&upload.staged_path, &job.id, &upload.filename)
            .await
        {
            Ok(path) => path,
            Err(e) => {
                self.discard_job(&job.id, &upload.staged_path).await;
                return Err(e.into());
            }
        };

        let job = match self.ctx.store.update(&job.id, &mut |job| {
            job.input_artifact = input.clone();
            Ok(())
        }) {
            Ok(job) => job,
            Err(e) => {
                self.discard_job(&job.id, &input).await;
                return Err(e.into());
            }
        };

        info!(
            job_id = %job.id,
            filename = %job.filename,
            size_mb = job.size_mb(),
            use_high_quality = job.use_high_quality,
            "Created job"
        );

        if let Err(e) = self.submit(&job.id) {
            warn!(job_id = %job.id, "Rejecting job that could not be submitted: {}", e);
            self.discard_job(&job.id, &job.input_artifact).await;
            return Err(e);
        }
        Ok(job)
    }

    /// Roll back a job that never got a pipeline task.
    async fn discard_job(&self, job_id: &str, input: &Path) {
        match self.ctx.store.delete(job_id) {
            Ok(_) | Err(JobError::NotFound(_)) => {}
            Err(e) => warn!(job_id = job_id, "Failed to remove rejected job: {}", e),
        }
        self.ctx.artifacts.remove_job_artifacts(job_id, input).await;
        self.ctx.broadcaster.close(job_id);
    }

    /// Spawn the pipeline task for a queued job.
    pub fn submit(&self, job_id: &str) -> Result<(), OrchestratorError> {
        let job = self.ctx.store.get(job_id)?;
        if job.status != JobStatus::Queued {
            return Err(OrchestratorError::NotQueued {
                job_id: job_id.to_string(),
                status: job.status.to_string(),
            });
        }

        // Hold the lock across spawn so the task cannot deregister before it is registered,
        // and so `stop` cannot drain between the running check and the insert.
        let mut active = self.ctx.lock_active();
        if !self.is_running() {
            return Err(OrchestratorError::NotRunning);
        }
        if active.contains_key(job_id) {
            return Err(OrchestratorError::AlreadyRunning(job_id.to_string()));
        }

        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let done = CancellationToken::new();
        let handle = tokio::spawn(run_job(
            Arc::clone(&self.ctx),
            job_id.to_string(),
            run_id,
            token.clone(),
            done.clone(),
            self.permits.clone(),
        ));

        active.insert(
            job_id.to_string(),
            ActiveRun {
                run_id,
                token,
                done,
                handle,
            },
        );
        JOBS_SUBMITTED.inc();
        debug!(job_id = job_id, run_id, "Submitted job");

        Ok(())
    }

    /// Stop a job's active run, if any, and wait for its task to exit.
    ///
    /// Concurrent callers for the same job all wait. Returns whether a run was found.
    pub async fn cancel(&self, job_id: &str) -> bool {
        let run = self.ctx.lock_active().get(job_id).map(|run| {
            run.token.cancel();
            (run.run_id, run.done.clone())
        });
        let Some((run_id, done)) = run else {
            return false;
        };

        info!(job_id = job_id, "Cancelling pipeline run");
        done.cancelled().await;
        // A panicked task never deregisters itself.
        self.ctx.deregister(job_id, run_id);
        true
    }

    /// Delete a job: stop its run, then remove the record and its artifacts.
    pub async fn delete_job(&self, job_id: &str) -> Result<Job, OrchestratorError> {
        // Fail fast on unknown ids without touching anything.
        self.ctx.store.get(job_id)?;

        self.cancel(job_id).await;

        let job = self.ctx.store.delete(job_id)?;
        self.ctx
            .artifacts
            .remove_job_artifacts(job_id, &job.input_artifact)
            .await;
        self.ctx.broadcaster.close(job_id);

        info!(job_id = job_id, "Deleted job");
        Ok(job)
    }
}

/// Body of a job's pipeline task.
async fn run_job(
    ctx: Arc<RunContext>,
    job_id: String,
    run_id: u64,
    token: CancellationToken,
    done: CancellationToken,
    permits: Option<Arc<Semaphore>>,
) {
    let _done = done.drop_guard();

    let permit = match acquire_slot(permits, &token).await {
        Some(permit) => permit,
        None => {
            ctx.fail(&job_id, "cancelled", "cancelled");
            ctx.deregister(&job_id, run_id);
            return;
        }
    };

    JOBS_RUNNING.inc();
    let started = Instant::now();

    let outcome = match ctx.drive(&job_id, &token).await {
        Ok(job) => {
            info!(
                job_id = %job_id,
                segments = job.segments.len(),
                duration_secs = started.elapsed().as_secs_f64(),
                "Pipeline completed"
            );
            JOBS_FINISHED.with_label_values(&["completed"]).inc();
            "completed"
        }
        Err(RunFailure::Stage { stage, error }) => {
            let reason = format!("{}_failed: {}", stage, error);
            error!(job_id = %job_id, stage = %stage, "Pipeline failed: {}", error);
            ctx.fail(&job_id, &reason, "failed")
        }
        Err(RunFailure::Cancelled) => {
            info!(job_id = %job_id, "Pipeline cancelled");
            ctx.fail(&job_id, "cancelled", "cancelled")
        }
        Err(RunFailure::Store(JobError::NotFound(_))) => {
            debug!(job_id = %job_id, "Job record disappeared during run");
            "cancelled"
        }
        Err(RunFailure::Store(e)) => {
            error!(job_id = %job_id, "Job store error during run: {}", e);
            ctx.fail(&job_id, &format!("internal_error: {}", e), "failed")
        }
    };

    JOBS_RUNNING.dec();
    JOB_DURATION
        .with_label_values(&[outcome])
        .observe(started.elapsed().as_secs_f64());
    drop(permit);

    ctx.deregister(&job_id, run_id);
}

/// Wait for a worker slot. `None` if cancelled first.
async fn acquire_slot(
    permits: Option<Arc<Semaphore>>,
    token: &CancellationToken,
) -> Option<Option<OwnedSemaphorePermit>> {
    let Some(semaphore) = permits else {
        return if token.is_cancelled() { None } else { Some(None) };
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        permit = semaphore.acquire_owned() => permit.ok().map(Some),
    }
}

impl RunContext {
    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashMap<String, ActiveRun>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove this run's registration, unless it was already taken by cancel/stop.
    fn deregister(&self, job_id: &str, run_id: u64) {
        let mut active = self.lock_active();
        if active.get(job_id).map(|run| run.run_id) == Some(run_id) {
            active.remove(job_id);
        }
    }

    /// Run the stages in order.
    async fn drive(
        self: &Arc<Self>,
        job_id: &str,
        token: &CancellationToken,
    ) -> Result<Job, RunFailure> {
        // Stage 1: transcription
        let job = self.advance(
            job_id,
            &JobTransition::EnterStage {
                stage: Stage::Asr,
                message: "Transcribing and translating audio...".to_string(),
            },
        )?;
        let input = job.input_artifact.clone();

        let transcription = self
            .call_stage(
                Stage::Asr,
                token,
                self.stages.transcriber.transcribe(
                    TranscriptionRequest {
                        job_id: job_id.to_string(),
                        input: input.clone(),
                        source_language: self.source_language.clone(),
                    },
                    self.progress_sink(job_id, token),
                ),
            )
            .await?;

        if transcription.segments.is_empty() {
            return Err(RunFailure::Stage {
                stage: Stage::Asr,
                error: StageError::malformed("transcription returned no segments"),
            });
        }

        let job = self.advance(
            job_id,
            &JobTransition::SegmentsTranscribed {
                segments: transcription.segments,
                transcript: transcription.text,
            },
        )?;

        // Stage 2: synthesis
        self.check_cancelled(token)?;
        self.advance(
            job_id,
            &JobTransition::EnterStage {
                stage: Stage::Tts,
                message: "Synthesizing dubbed speech...".to_string(),
            },
        )?;

        let voice = match transcription.reference_audio {
            Some(path) => VoiceReference::Audio(path),
            None => VoiceReference::ExtractFrom(input.clone()),
        };
        let audio = self
            .call_stage(
                Stage::Tts,
                token,
                self.stages.synthesizer.synthesize(
                    SynthesisRequest {
                        job_id: job_id.to_string(),
                        segments: job.segments.clone(),
                        voice,
                        output: self.artifacts.audio_path(job_id),
                    },
                    self.progress_sink(job_id, token),
                ),
            )
            .await?;

        let job = self.advance(
            job_id,
            &JobTransition::AudioSynthesized { audio: audio.path },
        )?;

        // Stage 3: lip sync
        self.check_cancelled(token)?;
        let message = if job.use_high_quality {
            "Running HD lip sync..."
        } else {
            "Running lip sync..."
        };
        self.advance(
            job_id,
            &JobTransition::EnterStage {
                stage: Stage::LipSync,
                message: message.to_string(),
            },
        )?;

        let Some(audio) = job.synthesized_audio.clone() else {
            return Err(RunFailure::Store(JobError::Storage(
                "synthesized audio missing after tts".to_string(),
            )));
        };
        let video = self
            .call_stage(
                Stage::LipSync,
                token,
                self.stages.lipsyncer.lipsync(
                    LipSyncRequest {
                        job_id: job_id.to_string(),
                        video: input,
                        audio,
                        use_high_quality: job.use_high_quality,
                        output: self.artifacts.output_path(job_id),
                    },
                    self.progress_sink(job_id, token),
                ),
            )
            .await?;

        self.check_cancelled(token)?;
        let job = self.advance(job_id, &JobTransition::Completed { output: video.path })?;
        Ok(job)
    }

    fn check_cancelled(&self, token: &CancellationToken) -> Result<(), RunFailure> {
        if token.is_cancelled() {
            Err(RunFailure::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Await a stage call, abandoning it if the job is cancelled.
    async fn call_stage<T>(
        &self,
        stage: Stage,
        token: &CancellationToken,
        call: impl Future<Output = Result<T, StageError>>,
    ) -> Result<T, RunFailure> {
        self.check_cancelled(token)?;

        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(StageError::Cancelled),
            result = call => result,
        };

        let label = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        STAGE_CALLS.with_label_values(&[stage.as_str(), label]).inc();
        STAGE_DURATION
            .with_label_values(&[stage.as_str()])
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(value) => Ok(value),
            Err(StageError::Cancelled) => Err(RunFailure::Cancelled),
            Err(error) => Err(RunFailure::Stage { stage, error }),
        }
    }

    /// Commit a transition, then publish it.
    fn advance(&self, job_id: &str, transition: &JobTransition) -> Result<Job, JobError> {
        let job = self.store.transition(job_id, transition)?;
        self.notify(&job);
        Ok(job)
    }

    fn notify(&self, job: &Job) {
        self.broadcaster.publish_job(job);
        if let Some(callback) = &self.on_update {
            callback(job);
        }
        if job.is_terminal() {
            self.broadcaster.close(&job.id);
        }
    }

    /// Mark the job failed unless it already finished. Returns the metrics outcome.
    fn fail(&self, job_id: &str, reason: &str, outcome: &'static str) -> &'static str {
        match self.advance(
            job_id,
            &JobTransition::Failed {
                reason: reason.to_string(),
            },
        ) {
            Ok(_) => {
                JOBS_FINISHED.with_label_values(&[outcome]).inc();
            }
            Err(JobError::NotFound(_)) => {
                debug!(job_id = job_id, "Job already deleted, not marking failed");
            }
            Err(e) => {
                warn!(job_id = job_id, "Could not mark job failed: {}", e);
            }
        }
        outcome
    }

    /// Progress sink that maps a stage's fractions onto the job record.
    fn progress_sink(self: &Arc<Self>, job_id: &str, token: &CancellationToken) -> StageProgress {
        let ctx = Arc::clone(self);
        let job_id = job_id.to_string();
        let token = token.clone();

        StageProgress::new(move |fraction, message| {
            if token.is_cancelled() {
                return;
            }
            let transition = JobTransition::StageProgress {
                fraction,
                message: message.to_string(),
            };
            if let Err(e) = ctx.advance(&job_id, &transition) {
                debug!(job_id = %job_id, "Ignoring stage progress: {}", e);
            }
        })
    }
}
