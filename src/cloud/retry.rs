use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::ProcessingError;

use super::transport::TransportError;

const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Transport-level retry with exponential backoff.
///
/// `max_attempts` counts every call, the first one included. The delay
/// before retry `n` (1-based) is `base_delay * 2^(n-1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        self.base_delay.saturating_mul(1 << exponent)
    }

    /// Issue `call` until it succeeds, fails non-retryably, or the attempt
    /// ceiling is reached.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut call: F) -> Result<T, ProcessingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_before_retry(attempt);
                    tracing::warn!(
                        op = op_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "[CloudJobs] Retrying after transport failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        op = op_name,
                        attempt,
                        error = %err,
                        "[CloudJobs] Giving up"
                    );
                    return Err(err.into_processing(attempt));
                }
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessingErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_delays_double() {
        let policy = policy();
        assert_eq!(policy.delay_before_retry(1), Duration::from_millis(100));
        assert_eq!(policy.delay_before_retry(2), Duration::from_millis(200));
        assert_eq!(policy.delay_before_retry(3), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_ceiling() {
        let calls = AtomicU32::new(0);
        let err = policy()
            .run("submit", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(TransportError::NoResponse {
                        reason: "reset".to_string(),
                    })
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            err.kind,
            ProcessingErrorKind::NetworkFailure { attempts: 3, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = policy()
            .run("status", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(TransportError::Status {
                        status: 400,
                        message: "bad options".to_string(),
                    })
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            err.kind,
            ProcessingErrorKind::ServerRejected { status: 400, .. }
        ));
    }
}
