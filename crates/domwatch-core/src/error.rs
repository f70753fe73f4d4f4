//! Error types for domwatch
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for domwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for domwatch
#[derive(Error, Debug)]
pub enum Error {
    /// Fact fetch errors (DNS or WHOIS lookups)
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Snapshot store errors
    #[error("Snapshot store error: {0}")]
    Store(String),

    /// Subscriber-specific error
    #[error("Subscriber error ({subscriber}): {message}")]
    Subscriber {
        /// Subscriber name
        subscriber: String,
        /// Error message
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// An operation did not finish in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Record or domain not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a snapshot store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a subscriber-specific error
    pub fn subscriber(subscriber: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscriber {
            subscriber: subscriber.into(),
            message: message.into(),
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
