//! Error types for infra-common

use thiserror::Error;

/// Result type for infrastructure operations
pub type InfraResult<T> = Result<T, InfraError>;

/// Errors raised while bootstrapping logging or configuration
#[derive(Debug, Error)]
pub enum InfraError {
    /// Configuration could not be read or deserialized
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A log level or filter directive could not be parsed
    #[error("Invalid log level: {level}")]
    InvalidLogLevel { level: String },

    /// The global tracing subscriber could not be installed
    #[error("Logging setup failed: {message}")]
    Logging { message: String },
}

impl InfraError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a logging setup error
    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }
}

impl From<::config::ConfigError> for InfraError {
    fn from(err: ::config::ConfigError) -> Self {
        Self::config(err.to_string())
    }
}
