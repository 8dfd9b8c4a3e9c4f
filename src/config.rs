//! Configuration loading using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (`config/scope.toml` by default)
//! 2. environment variables prefixed with `SCOPE_`
//!
//! Nested keys are separated by a double underscore, so single underscores
//! inside key names survive:
//!
//! ```text
//! SCOPE_APPLICATION__LOG_LEVEL=debug
//! SCOPE_ENGINE__MOVE_TIMEOUT_MS=5000
//! SCOPE_LIMITS__Z__MAX=2500
//! ```
//!
//! Every key has a default, so an empty file is a valid configuration.

use std::path::{Path, PathBuf};

use daq_core::{AppResult, CaptureSettings, DaqError, StageLimits};
use daq_experiment::EngineConfig;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/scope.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SCOPE_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Stage safety envelope
    pub limits: StageLimits,
    /// Job engine timing and retry
    pub engine: EngineConfig,
    /// Simulated camera
    pub camera: CameraConfig,
    /// Simulated stage
    pub stage: StageConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable text
    pub json_logs: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "scope-daq".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Camera configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Exposure (ms) used when a job does not set one
    pub default_exposure_ms: f64,
    /// Gain used when a job does not set one
    pub default_gain: f64,
    /// Extension of written frames
    pub file_extension: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let settings = CaptureSettings::default();
        Self {
            width: 1920,
            height: 1080,
            default_exposure_ms: settings.exposure_ms,
            default_gain: settings.gain,
            file_extension: "jpg".to_string(),
        }
    }
}

impl CameraConfig {
    /// Default capture settings.
    pub fn default_settings(&self) -> CaptureSettings {
        CaptureSettings {
            exposure_ms: self.default_exposure_ms,
            gain: self.default_gain,
        }
    }
}

/// Stage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Motion speed in steps per second
    pub speed_steps_per_sec: f64,
    /// Settling delay after each move in milliseconds
    pub settle_ms: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            speed_steps_per_sec: 1000.0,
            settle_ms: 50,
        }
    }
}

impl AppConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] plus environment overrides.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from `path` plus environment overrides, then validate.
    ///
    /// A missing file is not an error; defaults and environment apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Layered provider: defaults, then file, then environment.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Reject values the engine or simulator cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        let level = self.application.log_level.to_ascii_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        self.limits.check()?;
        self.engine.validate()?;

        daq_core::limits::validate_frame_size(self.camera.width, self.camera.height, 3)?;
        let settings = self.camera.default_settings();
        if !(settings.exposure_ms.is_finite() && settings.exposure_ms > 0.0) {
            return Err(DaqError::Configuration(format!(
                "camera.default_exposure_ms must be positive, got {}",
                settings.exposure_ms
            )));
        }
        if !(settings.gain.is_finite() && settings.gain > 0.0) {
            return Err(DaqError::Configuration(format!(
                "camera.default_gain must be positive, got {}",
                settings.gain
            )));
        }
        if self.camera.file_extension.is_empty() {
            return Err(DaqError::Configuration(
                "camera.file_extension must not be empty".to_string(),
            ));
        }

        if !(self.stage.speed_steps_per_sec.is_finite() && self.stage.speed_steps_per_sec > 0.0) {
            return Err(DaqError::Configuration(format!(
                "stage.speed_steps_per_sec must be positive, got {}",
                self.stage.speed_steps_per_sec
            )));
        }
        Ok(())
    }
}

/// Resolve the config path from an explicit argument or the default.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
