//! Timeout protection for hardware operations.

use std::future::Future;
use std::time::Duration;

use daq_core::{AppResult, DaqError};

/// Run a device operation, failing with [`DaqError::DeviceTimeout`] if it
/// does not finish within `timeout`.
pub async fn execute_with_timeout<T, F>(
    operation: &'static str,
    timeout: Duration,
    fut: F,
) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(operation, ?timeout, "device operation timed out");
            Err(DaqError::DeviceTimeout { operation, timeout })
        }
    }
}
