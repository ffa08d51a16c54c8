//! Error types for the ratelimit crate.

use thiserror::Error;

/// Main error type for ratelimit operations.
///
/// The limiter itself never fails; errors only come from loading configuration.
#[derive(Error, Debug)]
pub enum RatelimitError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for RatelimitError {
    fn from(err: ::config::ConfigError) -> Self {
        RatelimitError::Config(err.to_string())
    }
}

/// Result type alias for ratelimit operations.
pub type Result<T> = std::result::Result<T, RatelimitError>;
