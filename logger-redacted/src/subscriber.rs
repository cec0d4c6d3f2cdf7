// Global subscriber installation
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggerConfig};
use crate::error::{LoggerError, Result};

/// Build the filter: `RUST_LOG` when set, otherwise the configured level.
///
/// # Errors
///
/// Returns [`LoggerError::InvalidFilter`] if the configured directive does not parse.
pub fn build_filter(config: &LoggerConfig) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| LoggerError::InvalidFilter(e.to_string()))
}

/// Install the process-wide `tracing` subscriber.
///
/// # Errors
///
/// Fails when the level directive is invalid or another subscriber is
/// already installed (common in test binaries, where callers may ignore it).
pub fn init_logging(config: &LoggerConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match config.format {
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };

    installed.map_err(|e| LoggerError::AlreadyInitialized(e.to_string()))?;
    tracing::debug!(level = %config.level, format = ?config.format, "Logging initialised");
    Ok(())
}
