//! Bounded retry with exponential backoff for storage conflicts.

use std::future::Future;
use std::time::Duration;

use crate::error::ServiceError;

/// How often and how patiently a conflicting transaction is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(25),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            ..Self::default()
        }
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Runs `operation` until it succeeds, fails permanently, or runs out of
    /// attempts. Only [`ServiceError::is_transient`] failures are retried;
    /// exhausting the attempts yields [`ServiceError::Conflict`].
    pub async fn run<T, F, Fut>(&self, operation_name: &'static str, mut operation: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation = operation_name, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if error.is_transient() => {
                    if attempt >= max_attempts {
                        tracing::error!(
                            operation = operation_name,
                            attempt,
                            error = %error,
                            "Operation conflicted on every attempt"
                        );
                        return Err(ServiceError::Conflict { attempts: attempt });
                    }

                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        error = %error,
                        delay_ms = delay.as_millis() as u64,
                        "Transient conflict, retrying after delay"
                    );
                    metrics::counter!("order_transaction_retries_total", "operation" => operation_name)
                        .increment(1);
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_retry_succeeds_eventually() {
        let counter = Arc::new(AtomicU32::new(0));

        let result = fast_policy(3)
            .run("test", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ServiceError::Transient("deadlock".to_string()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_conflict() {
        let result: Result<(), _> = fast_policy(2)
            .run("test", || async {
                Err(ServiceError::Transient("serialization failure".to_string()))
            })
            .await;

        assert!(matches!(result, Err(ServiceError::Conflict { attempts: 2 })));
    }

    #[tokio::test]
    async fn test_business_failures_are_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = fast_policy(5)
            .run("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ServiceError::BadRequest("amount mismatch".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(ServiceError::BadRequest(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_grows_exponentially_and_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(350));
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
