mod cli;
mod run_once;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};
use dubbing_core::{
    load_config, load_config_from_env, validate_config, ArtifactStore, Config, HttpLipSyncer,
    HttpSynthesizer, HttpTranscriber, InMemoryJobStore, Job, JobStore, JobUpdateCallback,
    PipelineOrchestrator, ProgressBroadcaster, ServiceClient, StageClients,
};
use dubbing_server::{create_router, AppState};
use run_once::RunRequest;

/// Config file used when none is named.
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Logging may not be initialized yet if the config failed to load.
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

/// Everything a pipeline run needs, wired together.
pub(crate) struct Pipeline {
    pub store: Arc<dyn JobStore>,
    pub broadcaster: Arc<ProgressBroadcaster>,
    pub artifacts: ArtifactStore,
    pub stages: StageClients,
    pub orchestrator: Arc<PipelineOrchestrator>,
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = read_config(cli.config.as_deref())?;

    // Initialize logging
    let json = config.logging.json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();

    // Compute config hash so restarts with different settings are easy to spot
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));

    info!(config_hash = &config_hash[..16], "Configuration loaded successfully");
    info!(
        asr = %config.services.asr.url,
        tts = %config.services.tts.url,
        lipsync = %config.services.lipsync.url,
        "Stage services"
    );

    let pipeline = build_pipeline(&config).await?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, pipeline).await,
        Commands::Run {
            input,
            output,
            hd,
            skip_health,
        } => {
            let request = RunRequest {
                input,
                output,
                use_high_quality: hd,
                skip_health,
            };
            let result = run_once::run_once(&pipeline, request, shutdown_signal()).await;
            pipeline.orchestrator.stop().await;
            result.map(|_| ())
        }
    }
}

async fn build_pipeline(config: &Config) -> Result<Pipeline> {
    // Stage clients
    let stages = build_stage_clients(config)?;

    // Storage
    let artifacts = ArtifactStore::new(&config.storage);
    artifacts
        .ensure_dirs()
        .await
        .context("Failed to create storage directories")?;
    info!(
        upload_dir = ?config.storage.upload_dir,
        output_dir = ?config.storage.output_dir,
        work_dir = ?config.storage.work_dir,
        "Storage initialized"
    );

    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let broadcaster = Arc::new(ProgressBroadcaster::new(
        Arc::clone(&store),
        config.orchestrator.progress_buffer,
    ));

    let on_update: JobUpdateCallback = Arc::new(|job: &Job| {
        debug!(
            job_id = %job.id,
            status = %job.status,
            progress = job.progress_percent,
            "{}",
            job.message
        );
    });

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        config.orchestrator.clone(),
        Arc::clone(&store),
        stages.clone(),
        Arc::clone(&broadcaster),
        artifacts.clone(),
        Some(on_update),
    ));
    orchestrator.start().await;

    Ok(Pipeline {
        store,
        broadcaster,
        artifacts,
        stages,
        orchestrator,
    })
}

async fn serve(config: Config, pipeline: Pipeline) -> Result<()> {
    let orchestrator = Arc::clone(&pipeline.orchestrator);

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        pipeline.store,
        pipeline.orchestrator,
        pipeline.broadcaster,
        pipeline.artifacts,
        pipeline.stages,
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Stopping orchestrator...");
    orchestrator.stop().await;
    info!("Server shut down");

    Ok(())
}

/// Load the named config file, or `config.toml`.
///
/// An explicitly named file must exist; without one the defaults plus
/// `DUBBER_*` environment overrides are used.
fn read_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if path.exists() {
                load_config(&path)
                    .with_context(|| format!("Failed to load config from {:?}", path))?
            } else {
                load_config_from_env().context("Failed to load config from environment")?
            }
        }
    };

    validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

fn build_stage_clients(config: &Config) -> Result<StageClients> {
    let services = &config.services;

    let asr = ServiceClient::new("asr", &services.asr, services, config.retry.clone())
        .context("Failed to create transcription client")?;
    let tts = ServiceClient::new("tts", &services.tts, services, config.retry.clone())
        .context("Failed to create synthesis client")?;
    let lipsync = ServiceClient::new(
        "lipsync",
        &services.lipsync.endpoint(),
        services,
        config.retry.clone(),
    )
    .context("Failed to create lip-sync client")?;

    Ok(StageClients {
        transcriber: Arc::new(HttpTranscriber::new(asr)),
        synthesizer: Arc::new(HttpSynthesizer::new(tts, services.ffmpeg_path.clone())),
        lipsyncer: Arc::new(HttpLipSyncer::new(
            lipsync,
            services.lipsync.resize_factor,
            services.lipsync.pads.clone(),
        )),
    })
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
