// Logging module for structured logging using the tracing crate

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Logging initialization errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{0}': {1}")]
    InvalidFilter(String, String),
}

/// Build the event filter. `RUST_LOG` wins over the configured level.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .map_err(|e| LoggingError::InvalidFilter(config.level.clone(), e.to_string()))
}

/// Initialize the global tracing subscriber.
///
/// Events go to stderr so stdout stays free for command output. Returns
/// `Ok(false)` when a global subscriber was already installed (tests and
/// embedders may have set one up first).
///
/// # Examples
///
/// ```
/// use live_watermark::config::LoggingConfig;
/// use live_watermark::logging::init_subscriber;
///
/// init_subscriber(&LoggingConfig::default()).expect("Failed to initialize logging");
/// tracing::info!("Application started");
/// ```
pub fn init_subscriber(config: &LoggingConfig) -> Result<bool, LoggingError> {
    let filter = build_filter(config)?;

    let installed = match config.format {
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .is_ok(),
        LogFormat::Pretty => Registry::default()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .is_ok(),
    };

    Ok(installed)
}
