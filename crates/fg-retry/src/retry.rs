// SPDX-License-Identifier: MIT OR Apache-2.0
//! The generic retry loop.

use std::future::Future;
use std::time::Instant;

use crate::cancel::CancellationToken;
use crate::config::{RetryAttempt, RetryConfig, RetryMetadata, RetryOutcome};
use crate::error::RetryError;

/// Calls `op` up to `max_retries + 1` times with exponential backoff,
/// returning the first successful result along with metadata about failed
/// attempts.
///
/// `retryable` decides whether a given error should trigger a retry; a
/// non-retryable error is returned immediately as
/// [`RetryError::RetriesExhausted`]. `token` is polled before each attempt
/// and during each backoff sleep — cancellation stops the loop with
/// [`RetryError::Cancelled`] rather than waiting out the remaining delay.
pub async fn retry_async<T, E, F, Fut>(
    config: &RetryConfig,
    token: &CancellationToken,
    mut op: F,
    retryable: impl Fn(&E) -> bool,
) -> Result<RetryOutcome<T>, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let max_attempts = config.max_retries.saturating_add(1);
    let mut failed_attempts = Vec::new();

    for attempt in 0..max_attempts {
        if token.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        tracing::debug!(target: "factgraph.retry", attempt, max_attempts, "attempting operation");

        match op().await {
            Ok(value) => {
                let total_duration = start.elapsed();
                tracing::debug!(
                    target: "factgraph.retry",
                    attempt,
                    total_duration_ms = total_duration.as_millis() as u64,
                    "operation succeeded"
                );
                return Ok(RetryOutcome {
                    value,
                    metadata: RetryMetadata {
                        total_attempts: attempt + 1,
                        failed_attempts,
                        total_duration,
                    },
                });
            }
            Err(err) => {
                let is_last = attempt + 1 >= max_attempts;

                if !retryable(&err) {
                    tracing::debug!(target: "factgraph.retry", error = %err, "non-retryable error, giving up");
                    return Err(RetryError::RetriesExhausted(err));
                }
                if is_last {
                    tracing::warn!(target: "factgraph.retry", error = %err, attempt, "max retries exhausted");
                    return Err(RetryError::RetriesExhausted(err));
                }

                let delay = crate::config::compute_delay(config, attempt);
                tracing::warn!(
                    target: "factgraph.retry",
                    error = %err,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retryable error, backing off"
                );
                failed_attempts.push(RetryAttempt {
                    attempt,
                    error: err.to_string(),
                    delay,
                });

                let remaining = config.overall_timeout.saturating_sub(start.elapsed());
                if delay > remaining {
                    return Err(RetryError::RetriesExhausted(err));
                }

                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = token.cancelled() => return Err(RetryError::Cancelled),
                }
            }
        }
    }

    unreachable!("loop always returns before max_attempts iterations complete")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            overall_timeout: Duration::from_secs(5),
            jitter_factor: 0.0,
        }
    }

    #[tokio::test]
    async fn succeeds_on_the_first_attempt() {
        let token = CancellationToken::new();
        let outcome = retry_async(
            &fast_config(3),
            &token,
            || async { Ok::<_, String>(42) },
            |_: &String| true,
        )
        .await
        .unwrap();
        assert_eq!(outcome.value, 42);
        assert_eq!(outcome.metadata.total_attempts, 1);
        assert!(outcome.metadata.failed_attempts.is_empty());
    }

    #[tokio::test]
    async fn retries_until_success_and_records_failed_attempts() {
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let outcome = retry_async(
            &fast_config(3),
            &token,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok(n)
                    }
                }
            },
            |_: &String| true,
        )
        .await
        .unwrap();
        assert_eq!(outcome.value, 2);
        assert_eq!(outcome.metadata.total_attempts, 3);
        assert_eq!(outcome.metadata.failed_attempts.len(), 2);
    }

    #[tokio::test]
    async fn a_non_retryable_error_stops_immediately() {
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let err = retry_async(
            &fast_config(5),
            &token,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<u32, _>("terminal".to_string()) }
            },
            |_: &String| false,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RetryError::RetriesExhausted(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausting_retries_returns_the_last_error() {
        let token = CancellationToken::new();
        let err = retry_async(
            &fast_config(2),
            &token,
            || async { Err::<u32, _>("still failing".to_string()) },
            |_: &String| true,
        )
        .await
        .unwrap_err();
        match err {
            RetryError::RetriesExhausted(e) => assert_eq!(e, "still failing"),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn a_cancelled_token_stops_before_the_next_attempt() {
        let token = CancellationToken::new();
        token.cancel();
        let err = retry_async(
            &fast_config(3),
            &token,
            || async { Err::<u32, _>("never reached".to_string()) },
            |_: &String| true,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RetryError::Cancelled));
    }

    #[tokio::test]
    async fn cancellation_during_backoff_short_circuits_the_sleep() {
        let token = CancellationToken::new();
        let cancel_token = token.clone();
        let config = RetryConfig {
            max_retries: 5,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30),
            overall_timeout: Duration::from_secs(3600),
            jitter_factor: 0.0,
        };
        let handle = tokio::spawn(async move {
            retry_async(
                &config,
                &token,
                || async { Err::<u32, _>("keep failing".to_string()) },
                |_: &String| true,
            )
            .await
        });
        tokio::task::yield_now().await;
        cancel_token.cancel();
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, RetryError::Cancelled));
    }
}
