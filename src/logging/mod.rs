//! Logging setup.
//!
//! Library code logs through the `log` facade. [`init_logging`] installs a
//! `tracing-subscriber` formatter which also receives `log` records.

pub mod config;

pub use config::LogConfig;

use crate::error::{DataSpecError, DataSpecResult};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over the configured levels. Returns
/// `Ok(false)` when a global subscriber was already installed.
pub fn init_logging(config: &LogConfig) -> DataSpecResult<bool> {
    config
        .validate()
        .map_err(|e| DataSpecError::configuration_with_key(e, "logging"))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter_directives()))
        .map_err(|e| DataSpecError::configuration_with_key(e.to_string(), "logging"))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.include_module)
        .with_ansi(config.enable_colors);

    let installed = if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };
    Ok(installed)
}
