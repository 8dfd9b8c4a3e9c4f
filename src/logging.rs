//! Tracing subscriber setup.

use daq_core::{AppResult, DaqError};
use tracing_subscriber::EnvFilter;

use crate::config::ApplicationConfig;

/// Filter from `RUST_LOG` if set, otherwise the configured level for our
/// crates with dependencies held at `warn`.
pub fn env_filter(app: &ApplicationConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = app.log_level.to_ascii_lowercase();
        EnvFilter::new(format!(
            "warn,scope_daq={level},daq_core={level},daq_hardware={level},daq_experiment={level}"
        ))
    })
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(app: &ApplicationConfig) -> AppResult<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(app))
        .with_target(true);
    let result = if app.json_logs {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| DaqError::Configuration(format!("failed to initialise logging: {e}")))
}
