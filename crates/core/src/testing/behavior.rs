//! Behavior knobs shared by the mock stage clients.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::RwLock;

use crate::stage_client::{ServiceHealth, StageError};

/// Latency, failure injection and health for one mock service.
#[derive(Debug, Clone)]
pub(crate) struct MockBehavior {
    /// Simulated call latency in milliseconds, picked uniformly from the range.
    latency_ms: Arc<RwLock<RangeInclusive<u64>>>,
    /// If set, the next call fails with this error.
    next_error: Arc<RwLock<Option<StageError>>>,
    /// If set, every call fails with an error built by this function.
    always_fail: Arc<RwLock<Option<fn() -> StageError>>>,
    healthy: Arc<RwLock<bool>>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            latency_ms: Arc::new(RwLock::new(0..=0)),
            next_error: Arc::new(RwLock::new(None)),
            always_fail: Arc::new(RwLock::new(None)),
            healthy: Arc::new(RwLock::new(true)),
        }
    }
}

impl MockBehavior {
    pub async fn set_latency(&self, latency: Duration) {
        let ms = latency.as_millis() as u64;
        *self.latency_ms.write().await = ms..=ms;
    }

    pub async fn set_random_latency(&self, min: Duration, max: Duration) {
        *self.latency_ms.write().await = min.as_millis() as u64..=max.as_millis() as u64;
    }

    pub async fn set_next_error(&self, error: StageError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn set_always_fail(&self, make_error: Option<fn() -> StageError>) {
        *self.always_fail.write().await = make_error;
    }

    pub async fn set_healthy(&self, healthy: bool) {
        *self.healthy.write().await = healthy;
    }

    /// Sleep for the configured latency.
    pub async fn delay(&self) {
        let range = self.latency_ms.read().await.clone();
        let ms = if range.start() >= range.end() {
            *range.start()
        } else {
            rand::thread_rng().gen_range(range)
        };
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    /// The injected error for this call, if any.
    pub async fn take_error(&self) -> Option<StageError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Some(error);
        }
        let always_fail = *self.always_fail.read().await;
        always_fail.map(|make_error| make_error())
    }

    pub async fn health(&self) -> ServiceHealth {
        if *self.healthy.read().await {
            ServiceHealth::healthy(Some(serde_json::json!({ "status": "healthy", "mock": true })))
        } else {
            ServiceHealth::unreachable("mock service marked unhealthy")
        }
    }
}
