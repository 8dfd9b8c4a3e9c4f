//! Acquisition jobs for scope-daq.
//!
//! - [`plans`]: step generators for timelapse, grid and z-stack jobs
//! - [`engine`]: runs a job step by step against a device facade
//! - [`scheduler`]: one-job-at-a-time front door with pause/resume/cancel
//! - [`store`]: job and image persistence
//! - [`positions`]: named stage positions checked against the safety limits
//! - [`progress`]: progress notification sinks
//! - [`retry`]: bounded retry for transient device errors

pub mod engine;
pub mod plans;
pub mod positions;
pub mod progress;
pub mod retry;
pub mod scheduler;
pub mod step;
pub mod store;

pub use engine::{EngineConfig, JobEngine};
pub use plans::{GeneratorFactory, GeneratorRegistry, StepGenerator, Steps};
pub use positions::{NewPosition, PositionEdit, PositionStore, SavedPosition};
pub use progress::{
    BroadcastProgressSink, ProgressEvent, ProgressSink, RecordingProgressSink, TracingProgressSink,
};
pub use retry::RetryPolicy;
pub use scheduler::JobScheduler;
pub use step::{AcquisitionStep, StepOutcome};
pub use store::{ImageStore, InMemoryImageStore, InMemoryJobStore, JobStore};
