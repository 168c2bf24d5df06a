// Error types module

use thiserror::Error;

use crate::watermark::RenderError;

/// Configuration errors (unreadable file, bad YAML, missing env vars, invalid values)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Environment variable '{0}' is referenced but not set")]
    MissingEnv(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Centralized error type for the crate
///
/// Render failures never escape the orchestrator; they show up here only when
/// a caller drives the renderer or pipeline directly.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Managed container not found for selector '{0}'")]
    ContainerNotFound(String),

    #[error("Page fixture error: {0}")]
    Fixture(String),
}
