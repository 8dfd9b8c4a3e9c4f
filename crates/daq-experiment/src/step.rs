//! Acquisition steps and per-step outcomes.

use daq_core::{CaptureSettings, DaqError, ImageRef, TargetPosition};
use serde::{Deserialize, Serialize};

/// One move + capture unit of work.
///
/// Produced on demand by a step generator and never persisted; only the
/// image it yields is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionStep {
    /// Zero-based position in the job's sequence.
    pub index: u32,
    /// Absolute target; omitted axes stay where they are.
    pub target: TargetPosition,
    /// Camera settings for the capture.
    pub settings: CaptureSettings,
    /// File name stem for the captured frame.
    pub stem: String,
}

/// Result of executing one step.
///
/// The engine matches on this exhaustively: captures are the only tolerated
/// failure, everything else aborts the job.
#[derive(Debug)]
pub enum StepOutcome {
    /// Frame captured and persisted.
    Captured(ImageRef),
    /// Capture failed; the job continues with the next step.
    SoftFailure(String),
    /// Validation, motion or persistence failed; the job must stop.
    HardFailure(DaqError),
}
