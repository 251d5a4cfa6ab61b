//! Retry with exponential backoff for transient stage failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::StageError;
use crate::metrics::STAGE_RETRIES;

/// Retry configuration shared by all stage clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for any single delay, in milliseconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Randomize each delay by up to +/-30%.
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = self.backoff_multiplier.max(1.0).powi(retry.saturating_sub(1) as i32);
        let millis = (self.initial_backoff_ms as f64 * exp).min(self.max_backoff_ms as f64);
        Duration::from_millis(millis as u64)
    }

    fn delay(&self, retry: u32) -> Duration {
        let base = self.backoff(retry);
        if !self.jitter || base.is_zero() {
            return base;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-0.3..0.3);
        Duration::from_millis((base.as_millis() as f64 * factor) as u64)
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, stage: &str, mut op: F) -> Result<T, StageError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, StageError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt >= max_attempts => {
                if max_attempts == 1 {
                    return Err(e);
                }
                return Err(StageError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                let delay = policy.delay(attempt);
                warn!(
                    stage = stage,
                    "Attempt {}/{} failed ({}), retrying in {:?}",
                    attempt,
                    max_attempts,
                    e,
                    delay
                );
                STAGE_RETRIES.with_label_values(&[stage]).inc();
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
            backoff_multiplier: 2.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = with_retry(&fast_policy(3), "asr", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, StageError>(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = with_retry(&fast_policy(3), "tts", move |attempt| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(StageError::Connection("refused".into()))
                } else {
                    Ok("audio")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "audio");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = with_retry(&fast_policy(5), "lipsync", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                Err(StageError::Rejected {
                    status: 400,
                    body: "bad video".into(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(StageError::Rejected { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_wraps_last_error() {
        let result: Result<(), _> = with_retry(&fast_policy(2), "asr", |_| async {
            Err(StageError::ServerError {
                status: 503,
                body: "busy".into(),
            })
        })
        .await;

        match result {
            Err(StageError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, StageError::ServerError { status: 503, .. }));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
