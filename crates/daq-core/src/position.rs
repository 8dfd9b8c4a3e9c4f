//! Stage coordinates.
//!
//! All coordinates are in device units (motor steps). [`Position`] is a fully
//! resolved point; [`TargetPosition`] is a motion request where each axis is
//! optional and `None` means "leave this axis where it is".

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stage axis identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Horizontal axis.
    X,
    /// Vertical axis.
    Y,
    /// Focus axis.
    Z,
}

impl Axis {
    /// All axes in X, Y, Z order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Upper-case axis label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a saved stage position.
pub type PositionId = u64;

/// Absolute stage position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate in steps.
    pub x: f64,
    /// Y coordinate in steps.
    pub y: f64,
    /// Z coordinate in steps.
    pub z: f64,
}

impl Position {
    /// Construct a position from its three coordinates.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Coordinate for a single axis.
    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X={}, Y={}, Z={}", self.x, self.y, self.z)
    }
}

/// Motion request with optional axes.
///
/// Interpreted as absolute coordinates by the step generators and the
/// safety validator. Relative moves reuse the same shape as a per-axis delta
/// and must be resolved with [`TargetPosition::resolve_relative`] before they
/// are validated.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TargetPosition {
    /// Requested X, or `None` to keep the current value.
    #[serde(default)]
    pub x: Option<f64>,
    /// Requested Y, or `None` to keep the current value.
    #[serde(default)]
    pub y: Option<f64>,
    /// Requested Z, or `None` to keep the current value.
    #[serde(default)]
    pub z: Option<f64>,
}

impl TargetPosition {
    /// A target that leaves every axis unchanged.
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// A target specifying all three axes.
    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
        }
    }

    /// A target that moves only the focus axis.
    pub fn z_only(z: f64) -> Self {
        Self {
            z: Some(z),
            ..Self::default()
        }
    }

    /// True when no axis is requested.
    pub fn is_unchanged(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.z.is_none()
    }

    /// Requested value for one axis.
    pub fn get(&self, axis: Axis) -> Option<f64> {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Absolute interpretation: requested axes replace the current ones.
    pub fn resolve_absolute(&self, current: &Position) -> Position {
        Position {
            x: self.x.unwrap_or(current.x),
            y: self.y.unwrap_or(current.y),
            z: self.z.unwrap_or(current.z),
        }
    }

    /// Relative interpretation: requested axes are added to the current ones.
    pub fn resolve_relative(&self, current: &Position) -> Position {
        Position {
            x: current.x + self.x.unwrap_or(0.0),
            y: current.y + self.y.unwrap_or(0.0),
            z: current.z + self.z.unwrap_or(0.0),
        }
    }
}

impl From<Position> for TargetPosition {
    fn from(p: Position) -> Self {
        Self::xyz(p.x, p.y, p.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_keeps_omitted_axes() {
        let current = Position::new(10.0, 20.0, 30.0);
        let resolved = TargetPosition::z_only(5.0).resolve_absolute(&current);
        assert_eq!(resolved, Position::new(10.0, 20.0, 5.0));
    }

    #[test]
    fn test_relative_adds_deltas() {
        let current = Position::new(10.0, 20.0, 30.0);
        let delta = TargetPosition {
            x: Some(-5.0),
            y: None,
            z: Some(2.5),
        };
        assert_eq!(delta.resolve_relative(&current), Position::new(5.0, 20.0, 32.5));
    }

    #[test]
    fn test_unchanged_target() {
        assert!(TargetPosition::unchanged().is_unchanged());
        assert!(!TargetPosition::z_only(0.0).is_unchanged());
    }
}
