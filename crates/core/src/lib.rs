pub mod artifacts;
pub mod config;
pub mod job;
pub mod metrics;
pub mod orchestrator;
pub mod progress;
pub mod stage_client;
pub mod testing;

pub use artifacts::{ArtifactError, ArtifactStore, StagedUpload};
pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config, ConfigError,
    SanitizedConfig,
};
pub use job::{
    CreateJobRequest, InMemoryJobStore, Job, JobError, JobStatus, JobStore, JobTransition,
    Segment, Stage,
};
pub use orchestrator::{
    JobUpdateCallback, NewUpload, OrchestratorConfig, OrchestratorError, OrchestratorStatus,
    PipelineOrchestrator, StageClients,
};
pub use progress::{ProgressBroadcaster, ProgressEvent, ProgressSubscription};
pub use stage_client::{
    check_services, AggregateHealth, HttpLipSyncer, HttpSynthesizer, HttpTranscriber, LipSyncer,
    RetryPolicy, ServiceClient, ServiceHealth, StageError, StageProgress, Synthesizer, Transcriber,
};
