//! Capability traits implemented by stage and camera drivers.
//!
//! Drivers report failures with `anyhow`, matching the rest of the driver
//! layer. The [`crate::facade`] converts them into `DaqError` at the boundary
//! the experiment engine sees.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use daq_core::{CaptureSettings, ImageDescriptor, Position};

/// Three-axis motorized stage.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Move all axes to an absolute position and return the reached position.
    async fn move_abs(&self, target: Position) -> Result<Position>;

    /// Current position.
    async fn position(&self) -> Result<Position>;

    /// Wait for mechanical settling after a move.
    async fn wait_settled(&self) -> Result<()>;

    /// Halt all motion.
    async fn stop(&self) -> Result<()>;
}

/// Still camera.
#[async_trait]
pub trait Camera: Send + Sync {
    /// Apply exposure and gain.
    async fn apply_settings(&self, settings: &CaptureSettings) -> Result<()>;

    /// Expose one frame and store it under a name derived from `stem`.
    async fn capture(&self, stem: &str) -> Result<ImageDescriptor>;

    /// Sensor resolution as (width, height).
    fn resolution(&self) -> (u32, u32);
}

#[async_trait]
impl<T: Stage + ?Sized> Stage for Arc<T> {
    async fn move_abs(&self, target: Position) -> Result<Position> {
        (**self).move_abs(target).await
    }

    async fn position(&self) -> Result<Position> {
        (**self).position().await
    }

    async fn wait_settled(&self) -> Result<()> {
        (**self).wait_settled().await
    }

    async fn stop(&self) -> Result<()> {
        (**self).stop().await
    }
}

#[async_trait]
impl<T: Camera + ?Sized> Camera for Arc<T> {
    async fn apply_settings(&self, settings: &CaptureSettings) -> Result<()> {
        (**self).apply_settings(settings).await
    }

    async fn capture(&self, stem: &str) -> Result<ImageDescriptor> {
        (**self).capture(stem).await
    }

    fn resolution(&self) -> (u32, u32) {
        (**self).resolution()
    }
}
