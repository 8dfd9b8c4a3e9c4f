//! Capture settings and captured image records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::position::Position;

/// Image identifier assigned by the image store.
pub type ImageId = u64;

/// Camera settings applied for one capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// Exposure time in milliseconds.
    pub exposure_ms: f64,
    /// Analog gain multiplier.
    pub gain: f64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            exposure_ms: 100.0,
            gain: 1.0,
        }
    }
}

/// What the camera reports about a frame it wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// File name or storage handle.
    pub filename: String,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Encoded size in bytes.
    pub file_size: u64,
    /// Time the frame was read out.
    pub captured_at: DateTime<Utc>,
}

/// Record handed to the image store after a successful capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedImage {
    /// Owning job.
    pub job_id: JobId,
    /// File name or storage handle.
    pub filename: String,
    /// Stage position at capture time.
    pub position: Position,
    /// Settings used for the capture.
    pub settings: CaptureSettings,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Encoded size in bytes.
    pub file_size: u64,
    /// Time the frame was read out.
    pub captured_at: DateTime<Utc>,
}

impl CapturedImage {
    /// Combine a camera descriptor with the acquisition context.
    pub fn new(
        job_id: JobId,
        descriptor: ImageDescriptor,
        position: Position,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            job_id,
            filename: descriptor.filename,
            position,
            settings,
            width: descriptor.width,
            height: descriptor.height,
            file_size: descriptor.file_size,
            captured_at: descriptor.captured_at,
        }
    }
}

/// Lightweight reference used in progress notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Store identifier.
    pub id: ImageId,
    /// File name or storage handle.
    pub filename: String,
}
