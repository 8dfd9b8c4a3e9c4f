//! Bounded retry for transient device errors.
//!
//! Only errors where [`daq_core::DaqError::is_retryable`] holds are retried. The
//! default policy makes a single attempt.

use std::future::Future;
use std::time::Duration;

use daq_core::AppResult;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// How many times to try a device operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first. `0` behaves like `1`.
    pub max_attempts: u32,
    /// Pause between attempts in milliseconds.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 100,
        }
    }
}

impl RetryPolicy {
    /// Single attempt.
    pub fn none() -> Self {
        Self::default()
    }

    /// Up to `max_attempts` attempts with `backoff` between them.
    pub fn attempts(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff_ms: u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Pause between attempts.
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Final result of a retried operation.
#[derive(Debug)]
pub struct Attempt<T> {
    /// Last attempt's result.
    pub result: AppResult<T>,
    /// Attempts made after the first.
    pub retries: u32,
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy is exhausted.
pub async fn retry_device_op<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Attempt<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut retries = 0;
    loop {
        match op().await {
            Ok(value) => {
                return Attempt {
                    result: Ok(value),
                    retries,
                }
            }
            Err(err) if err.is_retryable() && retries + 1 < max_attempts => {
                retries += 1;
                warn!(
                    operation,
                    attempt = retries,
                    max_attempts,
                    error = %err,
                    "device operation failed, retrying"
                );
                tokio::time::sleep(policy.backoff()).await;
            }
            Err(err) => {
                return Attempt {
                    result: Err(err),
                    retries,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_core::DaqError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_default_policy_makes_one_attempt() {
        let calls = AtomicU32::new(0);
        let attempt: Attempt<()> = retry_device_op(&RetryPolicy::default(), "move", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DaqError::Device("jammed".into()))
        })
        .await;
        assert!(attempt.result.is_err());
        assert_eq!(attempt.retries, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_recovers() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::attempts(3, Duration::from_millis(10));
        let attempt = retry_device_op(&policy, "capture", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(DaqError::Device("dropped frame".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(attempt.result.unwrap(), 7);
        assert_eq!(attempt.retries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_is_returned_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::attempts(5, Duration::from_millis(10));
        let attempt: Attempt<()> = retry_device_op(&policy, "move", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DaqError::Parameter("bad".into()))
        })
        .await;
        assert!(matches!(attempt.result, Err(DaqError::Parameter(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_is_exhausted() {
        let policy = RetryPolicy::attempts(3, Duration::from_millis(10));
        let attempt: Attempt<()> = retry_device_op(&policy, "move", || async {
            Err(DaqError::Device("jammed".into()))
        })
        .await;
        assert!(attempt.result.is_err());
        assert_eq!(attempt.retries, 2);
    }
}
