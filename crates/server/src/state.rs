use std::sync::Arc;

use dubbing_core::{
    ArtifactStore, Config, JobStore, PipelineOrchestrator, ProgressBroadcaster, SanitizedConfig,
    StageClients,
};

/// Shared application state
pub struct AppState {
    config: Config,
    store: Arc<dyn JobStore>,
    orchestrator: Arc<PipelineOrchestrator>,
    broadcaster: Arc<ProgressBroadcaster>,
    artifacts: ArtifactStore,
    stages: StageClients,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn JobStore>,
        orchestrator: Arc<PipelineOrchestrator>,
        broadcaster: Arc<ProgressBroadcaster>,
        artifacts: ArtifactStore,
        stages: StageClients,
    ) -> Self {
        Self {
            config,
            store,
            orchestrator,
            broadcaster,
            artifacts,
            stages,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn job_store(&self) -> &dyn JobStore {
        self.store.as_ref()
    }

    pub fn orchestrator(&self) -> &PipelineOrchestrator {
        self.orchestrator.as_ref()
    }

    pub fn broadcaster(&self) -> &ProgressBroadcaster {
        self.broadcaster.as_ref()
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Stage clients, used for health probes.
    pub fn stages(&self) -> &StageClients {
        &self.stages
    }

    /// Upload limit in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.config.server.max_upload_mb.saturating_mul(1024 * 1024)
    }
}
