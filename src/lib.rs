//! scope-daq: automated time-lapse, grid and z-stack acquisition for a
//! camera + motorized stage microscope.
//!
//! The work is split across the workspace crates:
//!
//! - `daq-core`: positions, safety limits, job records and errors
//! - `daq-hardware`: stage/camera capabilities, the device facade and mocks
//! - `daq-experiment`: step generators, the job engine and scheduler
//!
//! This crate adds configuration, logging setup and station wiring for the
//! `scope-daq` binary.

pub mod config;
pub mod logging;
pub mod station;

pub use config::AppConfig;
pub use station::Station;

/// Common imports for embedding the engine.
pub mod prelude {
    pub use crate::config::AppConfig;
    pub use crate::station::Station;
    pub use daq_core::{
        AppResult, CaptureSettings, DaqError, Job, JobId, JobStatus, JobType, NewJob, Position,
        StageLimits, TargetPosition,
    };
    pub use daq_experiment::{
        EngineConfig, JobEngine, JobScheduler, NewPosition, PositionStore, ProgressEvent,
        ProgressSink, RetryPolicy,
    };
    pub use daq_hardware::{DeviceFacade, Instrument};
}
