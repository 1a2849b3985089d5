//! Retry with bounded exponential backoff and jitter.
//!
//! Applied only to errors classified retryable by
//! [`ClientError::is_retryable`]; anything else returns immediately. The
//! attempt budget, backoff curve, and jitter factor come from the deployment
//! [`RetryPolicy`].

use std::time::Duration;

use keygate_types::config::RetryPolicy;
use rand::Rng;

use crate::error::{ClientError, Result};

/// Executes an async operation with retry under the given policy.
///
/// # Retry Strategy
///
/// - **Exponential backoff**: `initial_backoff * multiplier^(attempt-1)`,
///   capped at `max_backoff`
/// - **Jitter**: each delay is drawn uniformly from
///   `[d * (1 - jitter), d * (1 + jitter)]` to avoid thundering herd
/// - **Termination**: after `max_attempts` total attempts, the last
///   retryable error is wrapped in [`ClientError::RetryExhausted`]
///
/// Non-retryable errors are returned as-is without consuming the budget.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    let mut backoff = policy.initial_backoff;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) if attempt >= policy.max_attempts => {
                tracing::warn!(
                    attempts = attempt,
                    error = %err,
                    "retry budget exhausted"
                );
                return Err(ClientError::RetryExhausted {
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            },
            Err(err) => {
                let delay = apply_jitter(backoff, policy.jitter);
                tracing::debug!(
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after backoff"
                );
                tokio::time::sleep(delay).await;

                backoff = std::cmp::min(
                    Duration::from_nanos(
                        (backoff.as_nanos() as f64 * policy.multiplier) as u64,
                    ),
                    policy.max_backoff,
                );
            },
        }
    }
}

/// Applies jitter to a duration.
///
/// Draws uniformly from `[dur * (1 - factor), dur * (1 + factor)]`; a
/// non-positive factor returns the duration unchanged, factors above 1 are
/// clamped.
#[must_use]
pub fn apply_jitter(dur: Duration, factor: f64) -> Duration {
    if factor <= 0.0 {
        return dur;
    }

    let factor = factor.clamp(0.0, 1.0);
    let mut rng = rand::rng();

    let base_nanos = dur.as_nanos() as f64;
    let min_nanos = base_nanos * (1.0 - factor);
    let max_nanos = base_nanos * (1.0 + factor);

    let jittered_nanos = rng.random_range(min_nanos..=max_nanos);
    Duration::from_nanos(jittered_nanos as u64)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use super::*;

    fn test_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: 0.0, // No jitter for deterministic tests
        }
    }

    fn retryable() -> ClientError {
        ClientError::Http { endpoint: "rpc".to_string(), status: 503 }
    }

    fn terminal() -> ClientError {
        ClientError::Rpc { code: -32000, message: "execution reverted".to_string() }
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result = with_retry(&test_policy(), || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ClientError>("ok")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result = with_retry(&test_policy(), || {
            let calls = Arc::clone(&calls_clone);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(retryable())
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhaustion_wraps_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<()> = with_retry(&test_policy(), || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(retryable())
            }
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, ClientError::RetryExhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_error_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<()> = with_retry(&test_policy(), || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(terminal())
            }
        })
        .await;

        assert!(matches!(result.unwrap_err(), ClientError::Rpc { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn jitter_zero_factor_is_identity() {
        let dur = Duration::from_millis(100);
        assert_eq!(apply_jitter(dur, 0.0), dur);
        assert_eq!(apply_jitter(dur, -1.0), dur);
    }
}
