//! Mock Hardware Implementations
//!
//! Provides simulated hardware devices for running jobs without physical hardware.
//! All mock devices use async-safe operations (tokio::time::sleep, not std::thread::sleep),
//! so tests can run them under a paused tokio clock.
//!
//! # Available Mocks
//!
//! - `MockStage` - Simulated three-axis stage with realistic timing
//! - `MockCamera` - Simulated still camera with exposure-timed captures
//!
//! Both support failure injection by call number, and hanging forever to
//! exercise watchdog timeouts.
//!
//! # Performance Characteristics
//!
//! - MockStage: 1000 steps/sec motion speed, 50ms settling time
//! - MockCamera: exposure time + 33ms frame readout

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use daq_core::limits::validate_frame_size;
use daq_core::{CaptureSettings, ImageDescriptor, Position};
use parking_lot::Mutex;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use crate::capabilities::{Camera, Stage};

/// Long enough that any watchdog fires first.
const HANG_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

// =============================================================================
// MockStage - Simulated Motion Stage
// =============================================================================

/// Mock three-axis stage with realistic timing
///
/// Simulates a stage with:
/// - Configurable motion speed (default 1000 steps/sec, slowest axis dominates)
/// - Configurable settling time (default 50ms)
/// - Thread-safe position tracking and a history of reached positions
///
/// # Example
///
/// ```rust,ignore
/// let stage = MockStage::new();
/// stage.move_abs(Position::new(100.0, 0.0, 0.0)).await?; // Takes ~100ms
/// assert_eq!(stage.position().await?.x, 100.0);
/// ```
pub struct MockStage {
    position: Arc<RwLock<Position>>,
    speed_steps_per_sec: f64,
    settle_time: Duration,
    attempts: AtomicUsize,
    history: Mutex<Vec<Position>>,
    fail_on: Mutex<HashSet<usize>>,
    hang: AtomicBool,
}

impl MockStage {
    /// Create new mock stage at the origin
    pub fn new() -> Self {
        Self::with_timing(1000.0, Duration::from_millis(50))
    }

    /// Create mock stage with custom speed and settling time
    ///
    /// # Arguments
    /// * `speed_steps_per_sec` - Motion speed in steps/sec
    /// * `settle_time` - Delay reported by `wait_settled`
    pub fn with_timing(speed_steps_per_sec: f64, settle_time: Duration) -> Self {
        Self {
            position: Arc::new(RwLock::new(Position::default())),
            speed_steps_per_sec,
            settle_time,
            attempts: AtomicUsize::new(0),
            history: Mutex::new(Vec::new()),
            fail_on: Mutex::new(HashSet::new()),
            hang: AtomicBool::new(false),
        }
    }

    /// Make the n-th call to `move_abs` (1-based) fail.
    pub fn fail_on_move(&self, attempt: usize) {
        self.fail_on.lock().insert(attempt);
    }

    /// Make every subsequent move block until the caller gives up.
    pub fn hang_moves(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// Number of completed moves.
    pub fn move_count(&self) -> usize {
        self.history.lock().len()
    }

    /// Positions reached by completed moves, in order.
    pub fn history(&self) -> Vec<Position> {
        self.history.lock().clone()
    }
}

impl Default for MockStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stage for MockStage {
    async fn move_abs(&self, target: Position) -> Result<Position> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.lock().contains(&attempt) {
            bail!("MockStage: injected failure on move #{attempt}");
        }
        if self.hang.load(Ordering::SeqCst) {
            debug!("MockStage: move #{attempt} hanging");
            sleep(HANG_DURATION).await;
        }

        let current = *self.position.read().await;
        let distance = (target.x - current.x)
            .abs()
            .max((target.y - current.y).abs())
            .max((target.z - current.z).abs());
        let delay_ms = (distance / self.speed_steps_per_sec * 1000.0) as u64;

        debug!("MockStage: Moving from {current} to {target} ({delay_ms}ms)");

        // CRITICAL: Use tokio::time::sleep, NOT std::thread::sleep
        sleep(Duration::from_millis(delay_ms)).await;

        *self.position.write().await = target;
        self.history.lock().push(target);
        debug!("MockStage: Reached {target}");
        Ok(target)
    }

    async fn position(&self) -> Result<Position> {
        Ok(*self.position.read().await)
    }

    async fn wait_settled(&self) -> Result<()> {
        sleep(self.settle_time).await;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        info!("MockStage: Stopped");
        Ok(())
    }
}

// =============================================================================
// MockCamera - Simulated Camera
// =============================================================================

/// Mock still camera
///
/// Simulates a camera with:
/// - Configurable resolution
/// - Exposure time + 33ms frame readout
/// - Frame counting for diagnostics
/// - JPEG-sized descriptors (roughly 10:1 over 24-bit RGB)
///
/// # Example
///
/// ```rust,ignore
/// let camera = MockCamera::new(1920, 1080);
/// let image = camera.capture("grid_1_x0_y0").await?;
/// assert_eq!(image.filename, "grid_1_x0_y0.jpg");
/// ```
pub struct MockCamera {
    resolution: (u32, u32),
    extension: String,
    settings: Arc<RwLock<CaptureSettings>>,
    frame_count: Arc<RwLock<u32>>,
    attempts: AtomicUsize,
    fail_on: Mutex<HashSet<usize>>,
    hang: AtomicBool,
}

impl MockCamera {
    /// Create new mock camera with specified resolution
    ///
    /// # Arguments
    /// * `width` - Frame width in pixels
    /// * `height` - Frame height in pixels
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            resolution: (width, height),
            extension: "jpg".to_string(),
            settings: Arc::new(RwLock::new(CaptureSettings::default())),
            frame_count: Arc::new(RwLock::new(0)),
            attempts: AtomicUsize::new(0),
            fail_on: Mutex::new(HashSet::new()),
            hang: AtomicBool::new(false),
        }
    }

    /// Use a different file extension for written frames.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Make the n-th call to `capture` (1-based) fail.
    pub fn fail_on_capture(&self, attempt: usize) {
        self.fail_on.lock().insert(attempt);
    }

    /// Make every subsequent capture block until the caller gives up.
    pub fn hang_captures(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// Get total number of frames captured
    pub async fn frame_count(&self) -> u32 {
        *self.frame_count.read().await
    }

    /// Settings applied most recently
    pub async fn settings(&self) -> CaptureSettings {
        *self.settings.read().await
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new(1920, 1080)
    }
}

#[async_trait]
impl Camera for MockCamera {
    async fn apply_settings(&self, settings: &CaptureSettings) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(settings.exposure_ms) || !positive(settings.gain) {
            bail!(
                "MockCamera: invalid settings exposure={}ms gain={}",
                settings.exposure_ms,
                settings.gain
            );
        }
        *self.settings.write().await = *settings;
        Ok(())
    }

    async fn capture(&self, stem: &str) -> Result<ImageDescriptor> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.lock().contains(&attempt) {
            bail!("MockCamera: injected failure on capture #{attempt}");
        }
        if self.hang.load(Ordering::SeqCst) {
            debug!("MockCamera: capture #{attempt} hanging");
            sleep(HANG_DURATION).await;
        }

        let exposure = self.settings.read().await.exposure_ms;
        // Exposure plus simulated 30fps readout
        sleep(Duration::from_secs_f64(exposure / 1000.0) + Duration::from_millis(33)).await;

        let (width, height) = self.resolution;
        let size = validate_frame_size(width, height, 3).map_err(|e| anyhow!("MockCamera: {e}"))?;

        let mut count = self.frame_count.write().await;
        *count += 1;
        debug!("MockCamera: Frame #{} readout complete", *count);

        Ok(ImageDescriptor {
            filename: format!("{stem}.{}", self.extension),
            width,
            height,
            file_size: size.bytes / 10,
            captured_at: Utc::now(),
        })
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_mock_stage_absolute_move() {
        let stage = MockStage::new();

        // Initial position should be the origin
        assert_eq!(stage.position().await.unwrap(), Position::default());

        let target = Position::new(100.0, 50.0, 10.0);
        stage.move_abs(target).await.unwrap();
        assert_eq!(stage.position().await.unwrap(), target);
        assert_eq!(stage.history(), vec![target]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_stage_timing_follows_slowest_axis() {
        let stage = MockStage::with_timing(100.0, Duration::ZERO);
        let start = tokio::time::Instant::now();
        stage
            .move_abs(Position::new(50.0, 200.0, 0.0))
            .await
            .unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_millis(2010));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_stage_injected_failure() {
        let stage = MockStage::new();
        stage.fail_on_move(2);

        stage.move_abs(Position::new(1.0, 0.0, 0.0)).await.unwrap();
        assert!(stage.move_abs(Position::new(2.0, 0.0, 0.0)).await.is_err());
        stage.move_abs(Position::new(3.0, 0.0, 0.0)).await.unwrap();

        assert_eq!(stage.move_count(), 2);
        assert_eq!(stage.position().await.unwrap().x, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_camera_capture() {
        let camera = MockCamera::new(640, 480);

        let image = camera.capture("timelapse_1_0000").await.unwrap();
        assert_eq!(image.filename, "timelapse_1_0000.jpg");
        assert_eq!((image.width, image.height), (640, 480));
        assert_eq!(image.file_size, 640 * 480 * 3 / 10);
        assert_eq!(camera.frame_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_camera_exposure_timing() {
        let camera = MockCamera::new(640, 480);
        camera
            .apply_settings(&CaptureSettings {
                exposure_ms: 200.0,
                gain: 1.0,
            })
            .await
            .unwrap();

        let start = tokio::time::Instant::now();
        camera.capture("frame").await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(233) && elapsed < Duration::from_millis(240));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_camera_rejects_bad_settings() {
        let camera = MockCamera::default();
        let result = camera
            .apply_settings(&CaptureSettings {
                exposure_ms: 0.0,
                gain: 1.0,
            })
            .await;
        assert!(result.is_err());
        assert_eq!(camera.settings().await, CaptureSettings::default());
    }

    #[tokio::test]
    async fn test_mock_camera_rejects_infinite_settings() {
        let camera = MockCamera::default();
        for (exposure_ms, gain) in [(f64::INFINITY, 1.0), (100.0, f64::INFINITY), (f64::NAN, 1.0)] {
            let result = camera
                .apply_settings(&CaptureSettings { exposure_ms, gain })
                .await;
            assert!(result.is_err(), "accepted exposure={exposure_ms} gain={gain}");
        }
        assert_eq!(camera.settings().await, CaptureSettings::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_camera_injected_failure_does_not_count_frame() {
        let camera = MockCamera::new(64, 64).with_extension("png");
        camera.fail_on_capture(1);

        assert!(camera.capture("a").await.is_err());
        let image = camera.capture("b").await.unwrap();
        assert_eq!(image.filename, "b.png");
        assert_eq!(camera.frame_count().await, 1);
    }

    #[test]
    fn test_mock_camera_resolution() {
        let camera = MockCamera::new(1920, 1080);
        assert_eq!(camera.resolution(), (1920, 1080));
    }
}
