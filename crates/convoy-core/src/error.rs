//! Error types for Convoy

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using ConvoyError
pub type Result<T> = std::result::Result<T, ConvoyError>;

/// Main error type for Convoy operations
#[derive(Debug, Error)]
pub enum ConvoyError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Missing required field
    #[error("Missing required configuration field: {0}")]
    MissingField(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// A runner referenced by name does not exist
    #[error("Cannot find runner '{0}' to extend")]
    RunnerNotFound(String),

    /// An executor referenced by name does not exist
    #[error("Cannot find executor '{0}' to extend")]
    ExecutorNotFound(String),

    /// An extends chain references itself
    #[error("Configuration extends cycle: {0}")]
    ExtendsCycle(String),

    /// A cache pattern still contains a placeholder after substitution
    #[error("Unknown placeholder in pattern '{0}'")]
    UnknownPlaceholder(String),

    /// A filter or cache pattern failed to compile
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON error during extends resolution
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvoyError {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }
}
