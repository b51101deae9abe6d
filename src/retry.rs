use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::ports::library::AdapterError;

/// Exponential backoff applied to every remote library call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1))
            .with_jitter()
    }
}

/// Longest server-requested wait we honour before the next attempt.
const MAX_SERVER_DELAY: Duration = Duration::from_secs(120);

/// Delay before the next attempt: the backoff's own delay, stretched to the
/// server's `Retry-After` when that is longer. `None` means the backoff is
/// exhausted and stays that way.
fn next_delay(err: &AdapterError, backoff: Option<Duration>) -> Option<Duration> {
    let delay = backoff?;
    match err {
        AdapterError::RateLimited {
            retry_after: Some(wait),
        } => Some(delay.max((*wait).min(MAX_SERVER_DELAY))),
        _ => Some(delay),
    }
}

/// Run `call` until it succeeds, fails with a non-transient error, or the
/// attempt ceiling is reached. The last error is returned in the latter cases.
pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    call: F,
) -> Result<T, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    call.retry(policy.backoff())
        .when(AdapterError::is_transient)
        .adjust(next_delay)
        .notify(|err: &AdapterError, delay: Duration| {
            log::warn!("{} failed ({}), retrying in {:?}", operation, err, delay);
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicUsize::new(0);
        let result = with_backoff(&fast_policy(4), "search", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AdapterError::Transient("timeout".into()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_backoff(&fast_policy(3), "search", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AdapterError::RateLimited { retry_after: None })
        })
        .await;

        assert!(matches!(result, Err(AdapterError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retry_after_stretches_delay() {
        let limited = |secs| AdapterError::RateLimited {
            retry_after: Some(Duration::from_secs(secs)),
        };
        let backoff = Some(Duration::from_millis(500));

        assert_eq!(next_delay(&limited(30), backoff), Some(Duration::from_secs(30)));
        // a shorter server hint never shortens our own backoff
        assert_eq!(next_delay(&limited(0), backoff), backoff);
        assert_eq!(next_delay(&limited(3600), backoff), Some(MAX_SERVER_DELAY));
        assert_eq!(
            next_delay(&AdapterError::Transient("timeout".into()), backoff),
            backoff
        );
        assert_eq!(next_delay(&limited(30), None), None);
    }

    #[tokio::test]
    async fn test_waits_for_retry_after_between_attempts() {
        let calls = AtomicUsize::new(0);
        let started = std::time::Instant::now();
        let result = with_backoff(&fast_policy(3), "search", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AdapterError::RateLimited {
                    retry_after: Some(Duration::from_millis(50)),
                })
            } else {
                Ok("found")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "found");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_does_not_retry_permanent_errors() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_backoff(&fast_policy(5), "create", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AdapterError::Remote {
                status: 400,
                message: "bad request".into(),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
