//! Error types for the Attune personalization engine
//!
//! Uses thiserror for structured error definitions. Only operations whose
//! caller can act on a failure return these errors; the conversation-facing
//! surface in [`crate::engine`] logs them and falls back to neutral defaults.

use thiserror::Error;

/// Main error type for Attune operations
#[derive(Error, Debug)]
pub enum AttuneError {
    /// Backing key-value store failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Layered configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// TOML configuration could not be parsed
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Experiment not registered
    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    /// Experiment lifecycle transition not allowed from the current status
    #[error("Experiment {experiment}: cannot transition from {from} to {to}")]
    InvalidTransition {
        experiment: String,
        from: String,
        to: String,
    },

    /// Caller supplied a value outside the accepted domain
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Attune operations
pub type Result<T> = std::result::Result<T, AttuneError>;

/// Convert anyhow::Error to AttuneError
impl From<anyhow::Error> for AttuneError {
    fn from(err: anyhow::Error) -> Self {
        AttuneError::Other(err.to_string())
    }
}

impl AttuneError {
    /// Build a configuration validation error
    pub fn config_message(message: impl Into<String>) -> Self {
        AttuneError::Config(config::ConfigError::Message(message.into()))
    }
}
