//! Shared retry utility for completion calls.

use novelist_core::RetryConfig;
use novelist_error::{CompletionError, CompletionErrorKind, RetryableError};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_retry2::strategy::{ExponentialBackoff, jitter};
use tokio_retry2::{Retry, RetryError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Delays between attempts: capped exponential growth from the initial
/// backoff, one delay fewer than the attempt budget.
fn backoff_delays(policy: &RetryConfig) -> Vec<Duration> {
    let retries = policy.max_attempts.saturating_sub(1);
    if policy.initial_backoff_ms == 0 {
        return vec![Duration::ZERO; retries];
    }

    // from_millis(2) doubles each step; factor scales the first delay to
    // the configured initial backoff
    let factor = (policy.initial_backoff_ms / 2).max(1);
    ExponentialBackoff::from_millis(2)
        .factor(factor)
        .max_delay(policy.max_backoff())
        .map(|delay| if policy.jitter { jitter(delay) } else { delay })
        .take(retries)
        .collect()
}

/// Runs `operation` until it succeeds, fails permanently, or exhausts the
/// attempt budget.
///
/// Transient failures are retried after a capped exponential backoff.
/// Validation and fatal failures are returned immediately. When every attempt
/// failed transiently the last failure is escalated to `RetriesExhausted`,
/// which is fatal. Cancelling `token` aborts the in-flight attempt or backoff
/// sleep and returns `Cancelled`.
#[tracing::instrument(skip(policy, token, operation), fields(max_attempts = policy.max_attempts))]
pub async fn retry_with_backoff<F, Fut, T>(
    label: &str,
    policy: &RetryConfig,
    token: &CancellationToken,
    mut operation: F,
) -> Result<T, CompletionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CompletionError>>,
{
    if token.is_cancelled() {
        return Err(CompletionError::new(CompletionErrorKind::Cancelled));
    }

    let attempts = AtomicUsize::new(0);
    let delays = backoff_delays(policy);

    let retrying = Retry::spawn(delays, || {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let call = operation();
        async move {
            match call.await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation succeeded after retry");
                    }
                    Ok(value)
                }
                Err(err) if err.is_retryable() => {
                    warn!(attempt, error = %err.kind, "Transient failure, retrying");
                    RetryError::to_transient(err)
                }
                Err(err) => RetryError::to_permanent(err),
            }
        }
    });

    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => {
            debug!("Retry loop cancelled");
            return Err(CompletionError::new(CompletionErrorKind::Cancelled));
        }
        outcome = retrying => outcome,
    };

    outcome.map_err(|err| {
        if err.is_retryable() {
            let attempts = attempts.load(Ordering::SeqCst);
            warn!(attempts, error = %err.kind, "All retry attempts exhausted");
            CompletionError::new(CompletionErrorKind::RetriesExhausted {
                attempts,
                last: err.kind.to_string(),
            })
        } else {
            err
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn fast_policy(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            jitter: false,
        }
    }

    fn timeout() -> CompletionError {
        CompletionError::new(CompletionErrorKind::Timeout("30s".into()))
    }

    #[test]
    fn test_delays_are_capped_and_bounded() {
        let policy = RetryConfig {
            max_attempts: 6,
            initial_backoff_ms: 1000,
            max_backoff_ms: 4000,
            jitter: false,
        };
        let delays = backoff_delays(&policy);
        assert_eq!(delays.len(), 5);
        assert_eq!(delays[0], Duration::from_millis(1000));
        assert_eq!(delays[1], Duration::from_millis(2000));
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(4000)));
    }

    #[tokio::test]
    async fn test_single_transient_failure_retries_once() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();

        let result = retry_with_backoff("draft", &fast_policy(5), &token, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(timeout())
                } else {
                    Ok("draft text")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "draft text");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_escalates_to_fatal() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();

        let err = retry_with_backoff("draft", &fast_policy(3), &token, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(timeout()) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            err.kind,
            CompletionErrorKind::RetriesExhausted { attempts: 3, .. }
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_fatal_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();

        let err = retry_with_backoff("ideas", &fast_policy(5), &token, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<(), _>(CompletionError::new(CompletionErrorKind::Unauthorized(
                    "invalid key".into(),
                )))
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err.kind, CompletionErrorKind::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_the_call() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();
        token.cancel();

        let err = retry_with_backoff("critique", &fast_policy(5), &token, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(err.kind, CompletionErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_backoff() {
        let token = CancellationToken::new();
        let policy = RetryConfig {
            max_attempts: 5,
            initial_backoff_ms: 60_000,
            max_backoff_ms: 60_000,
            jitter: false,
        };

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = retry_with_backoff("revise", &policy, &token, || async {
            Err::<(), _>(timeout())
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind, CompletionErrorKind::Cancelled);
    }
}
