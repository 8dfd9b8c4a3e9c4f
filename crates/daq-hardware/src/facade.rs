//! Device facade: the narrow camera + stage view used by the experiment engine.
//!
//! The engine only ever talks to [`DeviceFacade`]. [`Instrument`] is the
//! standard implementation, pairing any [`Stage`] with any [`Camera`]. It
//! resolves relative moves, refuses targets outside the stage limits, and
//! converts driver errors into [`DaqError::Device`].

use async_trait::async_trait;
use daq_core::{
    AppResult, CaptureSettings, DaqError, ImageDescriptor, Position, StageLimits, TargetPosition,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::capabilities::{Camera, Stage};

/// Parameters for one capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    /// Exposure and gain.
    pub settings: CaptureSettings,
    /// File name stem; the camera picks the extension.
    pub stem: String,
}

/// Move, capture and read position.
#[async_trait]
pub trait DeviceFacade: Send + Sync {
    /// Move the stage. With `relative` the target is a per-axis delta,
    /// otherwise omitted axes stay where they are. Returns the reached position.
    async fn move_to(&self, target: TargetPosition, relative: bool) -> AppResult<Position>;

    /// Capture one frame.
    async fn capture(&self, request: &CaptureRequest) -> AppResult<ImageDescriptor>;

    /// Current stage position.
    async fn current_position(&self) -> AppResult<Position>;
}

fn device_error(context: &str, err: anyhow::Error) -> DaqError {
    DaqError::Device(format!("{context}: {err:#}"))
}

/// A stage and a camera behind one facade.
pub struct Instrument<S, C> {
    stage: S,
    camera: C,
    limits: StageLimits,
}

impl<S: Stage, C: Camera> Instrument<S, C> {
    /// Pair a stage and a camera under the given safety limits.
    pub fn new(stage: S, camera: C, limits: StageLimits) -> Self {
        Self {
            stage,
            camera,
            limits,
        }
    }

    /// Underlying stage.
    pub fn stage(&self) -> &S {
        &self.stage
    }

    /// Underlying camera.
    pub fn camera(&self) -> &C {
        &self.camera
    }

    /// Move all axes to the origin.
    pub async fn home(&self) -> AppResult<Position> {
        info!("Homing all axes");
        self.move_to(TargetPosition::xyz(0.0, 0.0, 0.0), false).await
    }

    /// Emergency stop.
    pub async fn stop(&self) -> AppResult<()> {
        warn!("Emergency stop activated");
        self.stage
            .stop()
            .await
            .map_err(|e| device_error("stage stop failed", e))
    }
}

#[async_trait]
impl<S: Stage, C: Camera> DeviceFacade for Instrument<S, C> {
    async fn move_to(&self, target: TargetPosition, relative: bool) -> AppResult<Position> {
        let current = self
            .stage
            .position()
            .await
            .map_err(|e| device_error("stage position query failed", e))?;

        let absolute = if relative {
            target.resolve_relative(&current)
        } else {
            target.resolve_absolute(&current)
        };
        self.limits.validate_position(&absolute)?;

        debug!(from = %current, to = %absolute, "moving stage");
        let reached = self
            .stage
            .move_abs(absolute)
            .await
            .map_err(|e| device_error("stage move failed", e))?;
        self.stage
            .wait_settled()
            .await
            .map_err(|e| device_error("stage settle failed", e))?;
        Ok(reached)
    }

    async fn capture(&self, request: &CaptureRequest) -> AppResult<ImageDescriptor> {
        self.camera
            .apply_settings(&request.settings)
            .await
            .map_err(|e| device_error("camera settings rejected", e))?;
        self.camera
            .capture(&request.stem)
            .await
            .map_err(|e| device_error("capture failed", e))
    }

    async fn current_position(&self) -> AppResult<Position> {
        self.stage
            .position()
            .await
            .map_err(|e| device_error("stage position query failed", e))
    }
}
