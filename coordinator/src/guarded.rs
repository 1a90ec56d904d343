//! Guarded store calls: a per-call timeout inside a bounded retry loop.

use enrollment_core::error::StorageError;
use enrollment_runtime::retry::{RetryPolicy, retry_with_predicate};
use std::future::Future;
use std::time::Duration;

/// Timeout and retry budget applied to every store call the coordinator makes.
#[derive(Debug, Clone, PartialEq)]
pub struct CallGuard {
    /// Backoff between attempts
    pub retry: RetryPolicy,
    /// Limit on a single attempt
    pub call_timeout: Duration,
}

impl Default for CallGuard {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(2),
        }
    }
}

impl CallGuard {
    /// Guard with the given policy and per-call timeout.
    #[must_use]
    pub const fn new(retry: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            retry,
            call_timeout,
        }
    }

    /// Longest time one guarded call can take, every attempt timing out.
    #[must_use]
    pub fn worst_case(&self) -> Duration {
        let attempts = u32::try_from(self.retry.max_retries.saturating_add(1)).unwrap_or(u32::MAX);
        self.call_timeout
            .saturating_mul(attempts)
            .saturating_add(self.retry.total_backoff())
    }

    /// Run `call` under the per-call timeout, retrying transient failures.
    ///
    /// An attempt that exceeds the timeout counts as
    /// [`StorageError::Timeout`], which is transient: the same call is
    /// retried, so `call` must be safe to repeat.
    ///
    /// # Errors
    ///
    /// Returns the first permanent error, or the last transient one once the
    /// retry budget is spent.
    pub async fn call<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, StorageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let limit = self.call_timeout;
        retry_with_predicate(
            &self.retry,
            operation,
            || {
                let attempt = call();
                async move {
                    tokio::time::timeout(limit, attempt)
                        .await
                        .unwrap_or(Err(StorageError::Timeout(limit)))
                }
            },
            StorageError::is_transient,
        )
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn guard(max_retries: usize, call_timeout: Duration) -> CallGuard {
        CallGuard::new(
            RetryPolicy::builder()
                .max_retries(max_retries)
                .initial_delay(Duration::from_millis(1))
                .max_delay(Duration::from_millis(2))
                .build(),
            call_timeout,
        )
    }

    #[tokio::test]
    async fn hung_call_times_out_and_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);

        let result = guard(2, Duration::from_millis(10))
            .call("get_track", || {
                let c = Arc::clone(&c);
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    Ok::<_, StorageError>(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);

        let result: Result<(), _> = guard(5, Duration::from_secs(1))
            .call("adjust_capacity", || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(StorageError::Invalid("bad delta".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(StorageError::Invalid(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_budget_returns_last_transient_error() {
        let result: Result<(), _> = guard(1, Duration::from_millis(5))
            .call("adjust_capacity", || async {
                Err(StorageError::Unavailable("connection refused".into()))
            })
            .await;

        assert_eq!(
            result,
            Err(StorageError::Unavailable("connection refused".into()))
        );
    }

    #[test]
    fn worst_case_covers_every_attempt() {
        let guard = guard(2, Duration::from_millis(100));
        // 3 attempts of 100ms plus 1ms + 2ms of backoff
        assert_eq!(guard.worst_case(), Duration::from_millis(303));
    }
}
