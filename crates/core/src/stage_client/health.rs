//! Service health probes.

use std::collections::BTreeMap;

use serde::Serialize;

use super::traits::{LipSyncer, Synthesizer, Transcriber};

/// Reachability of a single service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    #[serde(rename = "ok")]
    Healthy,
    Unhealthy,
    Unreachable,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub status: HealthState,
    /// Body of the service's own health endpoint, if it returned JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    pub fn healthy(details: Option<serde_json::Value>) -> Self {
        Self {
            status: HealthState::Healthy,
            details,
            error: None,
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            status: HealthState::Unhealthy,
            details: None,
            error: Some(error.into()),
        }
    }

    pub fn unreachable(error: impl Into<String>) -> Self {
        Self {
            status: HealthState::Unreachable,
            details: None,
            error: Some(error.into()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}

/// Combined health of every stage service.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateHealth {
    /// "ok" when every service is healthy, otherwise "degraded".
    pub status: &'static str,
    pub services: BTreeMap<String, ServiceHealth>,
}

/// Probe all three services concurrently.
pub async fn check_services(
    transcriber: &dyn Transcriber,
    synthesizer: &dyn Synthesizer,
    lipsyncer: &dyn LipSyncer,
) -> AggregateHealth {
    let (asr, tts, lipsync) = futures::join!(
        transcriber.health(),
        synthesizer.health(),
        lipsyncer.health()
    );

    let status = if asr.is_healthy() && tts.is_healthy() && lipsync.is_healthy() {
        "ok"
    } else {
        "degraded"
    };

    let mut services = BTreeMap::new();
    services.insert("asr".to_string(), asr);
    services.insert("tts".to_string(), tts);
    services.insert("lipsync".to_string(), lipsync);

    AggregateHealth { status, services }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_omits_empty_fields() {
        let json = serde_json::to_value(ServiceHealth::healthy(None)).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "ok" }));

        let json = serde_json::to_value(ServiceHealth::unreachable("connection refused")).unwrap();
        assert_eq!(json["status"], "unreachable");
        assert_eq!(json["error"], "connection refused");
    }
}
