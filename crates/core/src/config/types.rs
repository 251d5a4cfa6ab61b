use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::orchestrator::OrchestratorConfig;
use crate::stage_client::RetryPolicy;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Upper bound for a single upload request body, in megabytes.
    pub max_upload_mb: u64,
    /// Allow any origin (the presentation layer is usually served elsewhere).
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8000,
            max_upload_mb: 2048,
            cors_permissive: true,
        }
    }
}

/// Where uploaded, intermediate and produced media live.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Per-job scratch space (synthesized audio, extracted voice reference).
    pub work_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("./uploads"),
            output_dir: PathBuf::from("./outputs"),
            work_dir: PathBuf::from("./work"),
        }
    }
}

/// A single external processing service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// Base URL, e.g. "http://localhost:8001"
    pub url: String,
    /// Whole-request timeout for the stage call, in seconds.
    pub timeout_secs: u64,
}

impl ServiceEndpoint {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            url: url.into(),
            timeout_secs,
        }
    }
}

/// Lip-sync service endpoint plus the tuning knobs forwarded with each call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LipSyncServiceConfig {
    pub url: String,
    pub timeout_secs: u64,
    /// Downscale factor applied by the service (1 = original resolution).
    pub resize_factor: u32,
    /// Face box padding "top bottom left right".
    pub pads: String,
}

impl LipSyncServiceConfig {
    pub fn endpoint(&self) -> ServiceEndpoint {
        ServiceEndpoint::new(self.url.clone(), self.timeout_secs)
    }
}

impl Default for LipSyncServiceConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8003".to_string(),
            timeout_secs: 1800,
            resize_factor: 1,
            pads: "0 10 0 0".to_string(),
        }
    }
}

/// External processing services.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServicesConfig {
    pub asr: ServiceEndpoint,
    pub tts: ServiceEndpoint,
    pub lipsync: LipSyncServiceConfig,
    pub connect_timeout_secs: u64,
    pub health_timeout_secs: u64,
    /// ffmpeg binary used to cut a voice reference when the transcription
    /// service did not leave one on the shared volume.
    pub ffmpeg_path: PathBuf,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            asr: ServiceEndpoint::new("http://localhost:8001", 600),
            tts: ServiceEndpoint::new("http://localhost:8002", 600),
            lipsync: LipSyncServiceConfig::default(),
            connect_timeout_secs: 10,
            health_timeout_secs: 5,
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of the human-readable format.
    pub json: bool,
}

/// Sanitized config for API responses
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub services: SanitizedServicesConfig,
    pub retry: RetryPolicy,
    pub orchestrator: OrchestratorConfig,
}

/// Service URLs may carry credentials in userinfo; only host-level data is exposed.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedServicesConfig {
    pub asr: SanitizedEndpoint,
    pub tts: SanitizedEndpoint,
    pub lipsync: SanitizedEndpoint,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedEndpoint {
    pub url: String,
    pub timeout_secs: u64,
}

impl From<&ServiceEndpoint> for SanitizedEndpoint {
    fn from(endpoint: &ServiceEndpoint) -> Self {
        Self {
            url: redact_userinfo(&endpoint.url),
            timeout_secs: endpoint.timeout_secs,
        }
    }
}

fn redact_userinfo(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}://***@{}", scheme, &rest[at + 1..]),
        None => url.to_string(),
    }
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            services: SanitizedServicesConfig {
                asr: SanitizedEndpoint::from(&config.services.asr),
                tts: SanitizedEndpoint::from(&config.services.tts),
                lipsync: SanitizedEndpoint::from(&config.services.lipsync.endpoint()),
            },
            retry: config.retry.clone(),
            orchestrator: config.orchestrator.clone(),
        }
    }
}
