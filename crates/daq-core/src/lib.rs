//! Core types for scope-daq.
//!
//! Shared by the hardware and experiment crates:
//!
//! - [`error`]: the `DaqError` type and `AppResult` alias
//! - [`position`]: stage coordinates and motion targets
//! - [`limits`]: the motion safety validator and shared hard limits
//! - [`job`]: job records and the status state machine
//! - [`image`]: capture settings and captured image records

pub mod error;
pub mod image;
pub mod job;
pub mod limits;
pub mod position;

pub use error::{AppResult, DaqError};
pub use image::{CaptureSettings, CapturedImage, ImageDescriptor, ImageId, ImageRef};
pub use job::{
    ControlRequest, Job, JobId, JobStatus, JobType, JobUpdate, LifecycleUpdate, NewJob,
    ParameterMap,
};
pub use limits::{AxisLimits, LimitViolation, StageLimits};
pub use position::{Axis, Position, PositionId, TargetPosition};
