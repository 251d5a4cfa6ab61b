//! Shared harness for orchestrator integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use dubbing_core::testing::{fixtures, MockLipSyncer, MockSynthesizer, MockTranscriber};
use dubbing_core::{
    ArtifactStore, InMemoryJobStore, Job, JobStore, NewUpload, OrchestratorConfig,
    PipelineOrchestrator, ProgressBroadcaster, Stage,
};

/// All dependencies of an orchestrator, wired to mocks and a temp dir.
pub struct TestHarness {
    pub store: Arc<InMemoryJobStore>,
    pub broadcaster: Arc<ProgressBroadcaster>,
    pub artifacts: ArtifactStore,
    pub transcriber: MockTranscriber,
    pub synthesizer: MockSynthesizer,
    pub lipsyncer: MockLipSyncer,
    /// Every committed job update, in commit order.
    pub updates: Arc<Mutex<Vec<Job>>>,
    pub temp_dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(InMemoryJobStore::new());
        let broadcaster = Arc::new(ProgressBroadcaster::new(store.clone(), 64));
        let artifacts = ArtifactStore::new(&fixtures::storage_config(temp_dir.path()));

        Self {
            store,
            broadcaster,
            artifacts,
            transcriber: MockTranscriber::new(),
            synthesizer: MockSynthesizer::new(),
            lipsyncer: MockLipSyncer::new(),
            updates: Arc::new(Mutex::new(Vec::new())),
            temp_dir,
        }
    }

    pub fn create_orchestrator(&self, max_concurrent_jobs: usize) -> PipelineOrchestrator {
        let config = OrchestratorConfig {
            max_concurrent_jobs,
            ..Default::default()
        };

        let updates = self.updates.clone();
        PipelineOrchestrator::new(
            config,
            self.store.clone() as Arc<dyn JobStore>,
            fixtures::stage_clients(&self.transcriber, &self.synthesizer, &self.lipsyncer),
            self.broadcaster.clone(),
            self.artifacts.clone(),
            Some(Arc::new(move |job: &Job| {
                updates.lock().unwrap().push(job.clone());
            })),
        )
    }

    /// Stream a fake video through the artifact store and create a job for it.
    pub async fn upload(
        &self,
        orchestrator: &PipelineOrchestrator,
        filename: &str,
        use_high_quality: bool,
    ) -> Job {
        let mut staged = self
            .artifacts
            .begin_upload(0)
            .await
            .expect("Failed to stage upload");
        staged
            .write_chunk(format!("fake video {}", filename).as_bytes())
            .await
            .expect("Failed to write upload");
        let (staged_path, size_bytes) = staged.finish().await.expect("Failed to finish upload");

        orchestrator
            .create_job(NewUpload {
                filename: filename.to_string(),
                staged_path,
                size_bytes,
                use_high_quality,
            })
            .await
            .expect("Failed to create job")
    }

    /// Poll until the job satisfies `predicate`.
    pub async fn wait_for(
        &self,
        job_id: &str,
        timeout: Duration,
        predicate: impl Fn(&Job) -> bool,
    ) -> Job {
        let start = Instant::now();
        loop {
            let job = self.store.get(job_id).expect("Job should exist");
            if predicate(&job) {
                return job;
            }
            if start.elapsed() > timeout {
                panic!(
                    "Timed out waiting for job {} (status={}, stage={:?})",
                    job_id, job.status, job.current_stage
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn wait_for_terminal(&self, job_id: &str) -> Job {
        self.wait_for(job_id, Duration::from_secs(10), |job| job.is_terminal())
            .await
    }

    pub async fn wait_for_stage(&self, job_id: &str, stage: Stage) -> Job {
        self.wait_for(job_id, Duration::from_secs(10), |job| {
            job.current_stage == Some(stage)
        })
        .await
    }

    /// Committed updates for one job.
    pub fn updates_for(&self, job_id: &str) -> Vec<Job> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|job| job.id == job_id)
            .cloned()
            .collect()
    }
}
