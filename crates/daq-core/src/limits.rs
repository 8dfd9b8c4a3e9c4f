//! Stage safety limits and shared hard limits.
//!
//! Every stage motion is gated by [`StageLimits::validate`] before a move is
//! issued. Bounds are inclusive on both ends; an axis the target leaves
//! unchanged is not checked. The validator never interprets relative deltas,
//! callers resolve them first (see [`StageLimits::validate_relative`]).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::DaqError;
use crate::position::{Axis, Position, TargetPosition};

/// Maximum number of steps a single job may generate.
pub const MAX_JOB_STEPS: u32 = 1_000_000;
/// Maximum supported width/height for captured frames.
pub const MAX_FRAME_DIMENSION: u32 = 65_536;

/// Inclusive bound for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisLimits {
    /// Lowest permitted coordinate.
    pub min: f64,
    /// Highest permitted coordinate.
    pub max: f64,
}

impl AxisLimits {
    /// Construct an axis bound.
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Inclusive containment. NaN is never contained.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Reason a target was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("{axis} position {value} out of range [{min}, {max}]")]
pub struct LimitViolation {
    /// Offending axis.
    pub axis: Axis,
    /// Requested coordinate.
    pub value: f64,
    /// Configured lower bound.
    pub min: f64,
    /// Configured upper bound.
    pub max: f64,
}

/// Safety envelope for the three stage axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageLimits {
    /// X bound.
    pub x: AxisLimits,
    /// Y bound.
    pub y: AxisLimits,
    /// Z bound.
    pub z: AxisLimits,
}

impl Default for StageLimits {
    fn default() -> Self {
        Self {
            x: AxisLimits::new(0.0, 10_000.0),
            y: AxisLimits::new(0.0, 10_000.0),
            z: AxisLimits::new(0.0, 5_000.0),
        }
    }
}

impl StageLimits {
    /// Bound for one axis.
    pub fn axis(&self, axis: Axis) -> &AxisLimits {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }

    /// Validate an absolute target. Omitted axes are not checked.
    ///
    /// Axes are checked in X, Y, Z order and the first violation is returned.
    pub fn validate(&self, target: &TargetPosition) -> Result<(), LimitViolation> {
        for axis in Axis::ALL {
            if let Some(value) = target.get(axis) {
                let bound = self.axis(axis);
                if !bound.contains(value) {
                    return Err(LimitViolation {
                        axis,
                        value,
                        min: bound.min,
                        max: bound.max,
                    });
                }
            }
        }
        Ok(())
    }

    /// Validate a fully resolved position.
    pub fn validate_position(&self, position: &Position) -> Result<(), LimitViolation> {
        self.validate(&TargetPosition::from(*position))
    }

    /// Resolve `current + delta` and validate the result.
    ///
    /// Returns the absolute target on success.
    pub fn validate_relative(
        &self,
        current: &Position,
        delta: &TargetPosition,
    ) -> Result<Position, LimitViolation> {
        let target = delta.resolve_relative(current);
        self.validate_position(&target)?;
        Ok(target)
    }

    /// Check that the limits themselves are usable.
    pub fn check(&self) -> Result<(), DaqError> {
        for axis in Axis::ALL {
            let bound = self.axis(axis);
            if !bound.min.is_finite() || !bound.max.is_finite() {
                return Err(DaqError::Configuration(format!(
                    "{axis} limits must be finite, got [{}, {}]",
                    bound.min, bound.max
                )));
            }
            if bound.min > bound.max {
                return Err(DaqError::Configuration(format!(
                    "{axis} limits inverted: min {} > max {}",
                    bound.min, bound.max
                )));
            }
        }
        Ok(())
    }
}

/// Validated frame sizing information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    /// Pixel count.
    pub pixels: u64,
    /// Byte count.
    pub bytes: u64,
}

/// Validate frame dimensions and calculate pixel/byte sizes safely.
pub fn validate_frame_size(
    width: u32,
    height: u32,
    bytes_per_pixel: u64,
) -> Result<FrameSize, DaqError> {
    if width == 0 || height == 0 || width > MAX_FRAME_DIMENSION || height > MAX_FRAME_DIMENSION {
        return Err(DaqError::Configuration(format!(
            "frame {width}x{height} outside 1..={MAX_FRAME_DIMENSION}"
        )));
    }

    let pixels = u64::from(width) * u64::from(height);
    let bytes = pixels
        .checked_mul(bytes_per_pixel)
        .ok_or_else(|| DaqError::Configuration("frame byte size overflow".to_string()))?;

    Ok(FrameSize { pixels, bytes })
}
