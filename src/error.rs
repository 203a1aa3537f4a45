//! Error types for the Tollgate engine.

use thiserror::Error;

/// Main error type for Tollgate operations.
///
/// A denied request is never an error: it is a [`Decision`](crate::ratelimit::Decision)
/// with `allowed == false`.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// A limiter was configured with a non-positive capacity, window or refill rate
    #[error("Invalid limiter configuration: {0}")]
    InvalidConfiguration(String),

    /// Configuration loading or parsing errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Neither the requested tier nor a default tier is registered
    #[error("Unknown rate limit tier: {0}")]
    UnknownTier(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for TollgateError {
    fn from(err: config::ConfigError) -> Self {
        TollgateError::Config(err.to_string())
    }
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
