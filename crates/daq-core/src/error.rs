//! Custom error types for the acquisition system.
//!
//! `DaqError` is the single error type shared by the core, hardware and
//! experiment crates. It is built with `thiserror` so that lower level
//! failures convert cleanly with the `?` operator.
//!
//! ## Error Hierarchy
//!
//! - **`Parameter`**: job parameters that a step generator cannot accept
//!   (wrong type, non-positive step size, empty range). Raised before any
//!   device interaction.
//! - **`SafetyLimit`**: a motion target outside the configured stage bounds.
//!   Carries the structured [`LimitViolation`] so callers can report the
//!   exact axis and bound.
//! - **`Device`** / **`DeviceTimeout`**: camera or stage failures. The
//!   experiment engine decides whether these are fatal (motion) or tolerated
//!   (capture).
//! - **`UnknownJobType`**: no step generator is registered for a job type.
//! - **`InvalidTransition`**: a status write that the job state machine does
//!   not allow. Used by job stores to protect externally set pause/cancel
//!   requests from being overwritten.
//! - **`Config`** / **`Configuration`**: loading and semantic validation of
//!   configuration files.

use std::time::Duration;

use thiserror::Error;

use crate::job::{JobId, JobStatus};
use crate::limits::LimitViolation;
use crate::position::PositionId;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Invalid or missing generator parameters.
    #[error("Parameter error: {0}")]
    Parameter(String),

    /// Target position violates a stage safety limit.
    #[error("Safety limit violated: {0}")]
    SafetyLimit(#[from] LimitViolation),

    /// Camera or stage reported a failure.
    #[error("Device error: {0}")]
    Device(String),

    /// A device operation did not finish within its watchdog timeout.
    #[error("{operation} timed out after {timeout:?}. Check hardware connection.")]
    DeviceTimeout {
        /// Operation name, e.g. "stage move".
        operation: &'static str,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The instrument is already occupied by another job.
    #[error("Instrument is busy with job {active}")]
    DeviceBusy {
        /// Job currently holding the instrument.
        active: JobId,
    },

    /// No step generator is registered for the job type.
    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    /// Job does not exist in the store.
    #[error("Job {0} not found")]
    JobNotFound(JobId),

    /// Saved position does not exist.
    #[error("Position {0} not found")]
    PositionNotFound(PositionId),

    /// Status change not permitted by the job state machine.
    #[error("Invalid job status transition: {from} -> {to}")]
    InvalidTransition {
        /// Status stored when the write was attempted.
        from: JobStatus,
        /// Requested status.
        to: JobStatus,
    },

    /// A field write that would break a job invariant.
    #[error("Job invariant violated: {0}")]
    JobInvariant(String),

    /// Job or image store failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Progress notification could not be delivered.
    #[error("Notification error: {0}")]
    Notification(String),

    /// Configuration file could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but is semantically invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaqError {
    /// Whether a retry policy may re-attempt the operation that produced this error.
    ///
    /// Only transient device failures qualify. Limit violations and parameter
    /// errors are deterministic and never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DaqError::Device(_) | DaqError::DeviceTimeout { .. })
    }
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Axis;

    #[test]
    fn test_error_display() {
        let err = DaqError::Device("stage controller offline".to_string());
        assert_eq!(err.to_string(), "Device error: stage controller offline");
    }

    #[test]
    fn test_timeout_message_names_operation() {
        let err = DaqError::DeviceTimeout {
            operation: "camera capture",
            timeout: Duration::from_secs(30),
        };
        assert!(err.to_string().starts_with("camera capture timed out after 30s"));
    }

    #[test]
    fn test_limit_violation_converts() {
        let violation = LimitViolation {
            axis: Axis::Z,
            value: 6000.0,
            min: 0.0,
            max: 5000.0,
        };
        let err: DaqError = violation.into();
        assert_eq!(
            err.to_string(),
            "Safety limit violated: Z position 6000 out of range [0, 5000]"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(DaqError::Device("nack".into()).is_retryable());
        assert!(DaqError::DeviceTimeout {
            operation: "stage move",
            timeout: Duration::from_millis(10)
        }
        .is_retryable());
        assert!(!DaqError::Parameter("step_x".into()).is_retryable());
        assert!(!DaqError::UnknownJobType("manual".into()).is_retryable());
    }
}
