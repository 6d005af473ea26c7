//! Infrastructure error type
//!
//! Everything that can go wrong while loading configuration or wiring up
//! logging and metrics. Core component failures stay [`ResilienceError`] and
//! are wrapped here only when they surface through configuration validation.

use std::path::PathBuf;

use resilex_common::ResilienceError;

/// Errors raised by configuration loading and observability setup
#[derive(Debug, thiserror::Error)]
pub enum InfraError {
    /// A required `RESILEX_*` variable is not set
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    /// An environment variable is set but does not parse
    #[error("Invalid value for {key}: {message}")]
    InvalidEnv { key: String, message: String },

    /// An explicitly requested config file does not exist
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Probing found no config file
    #[error("No config file found in any of the standard locations")]
    NoConfigFile,

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON format: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid TOML format: {0}")]
    Toml(#[from] toml::de::Error),

    /// Parsed settings failed component validation
    #[error(transparent)]
    Validation(#[from] ResilienceError),

    #[error("Failed to install tracing subscriber: {0}")]
    Tracing(String),

    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl InfraError {
    pub(crate) fn invalid_env(key: &str, message: impl ToString) -> Self {
        Self::InvalidEnv { key: key.to_string(), message: message.to_string() }
    }

    /// `true` when the failure came from the configuration source itself
    /// rather than from the environment around it
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::MissingEnv(_)
                | Self::InvalidEnv { .. }
                | Self::UnsupportedFormat(_)
                | Self::Json(_)
                | Self::Toml(_)
                | Self::Validation(_)
        )
    }
}

/// Result alias for infrastructure operations
pub type InfraResult<T> = Result<T, InfraError>;
