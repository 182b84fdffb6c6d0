//! Bounded exponential backoff over `backoff::future::retry`.

use crate::error::{BridgeError, Result};
use backoff::ExponentialBackoffBuilder;
use serde::Deserialize;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or runs out
/// of attempts. The last error is returned on exhaustion.
pub async fn retry_bounded<T, F, Fut, R>(
    policy: &RetryPolicy,
    what: &str,
    retryable: R,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    R: Fn(&BridgeError) -> bool,
{
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(policy.initial_backoff_ms))
        .with_max_interval(Duration::from_millis(policy.max_backoff_ms))
        .with_max_elapsed_time(None)
        .build();
    let attempts = AtomicU32::new(0);
    let max_attempts = policy.max_attempts.max(1);

    backoff::future::retry(backoff, || {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let fut = op();
        let retryable = &retryable;
        async move {
            match fut.await {
                Ok(value) => Ok(value),
                Err(e) if retryable(&e) && attempt < max_attempts => {
                    debug!("{} failed (attempt {}/{}): {}", what, attempt, max_attempts, e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => {
                    if retryable(&e) {
                        warn!("{} giving up after {} attempts: {}", what, attempt, e);
                    }
                    Err(backoff::Error::permanent(e))
                }
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_bounded(&fast(5), "op", BridgeError::is_transient, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(BridgeError::ChainRpc("connection reset".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_bounded(&fast(3), "op", BridgeError::is_transient, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BridgeError::ChainRpc("down".into())) }
        })
        .await;
        assert_eq!(result, Err(BridgeError::ChainRpc("down".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_bounded(&fast(5), "op", BridgeError::is_transient, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BridgeError::Decode("bad selector".into())) }
        })
        .await;
        assert!(matches!(result, Err(BridgeError::Decode(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
