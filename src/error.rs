//! Error types for redrate.

use std::time::Duration;

use thiserror::Error;

/// Main error type for redrate operations.
#[derive(Error, Debug)]
pub enum RedrateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The shared store rejected or failed a command
    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    /// The store did not answer in time; the call may or may not have
    /// mutated state.
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    /// The decision script returned a reply of an unexpected shape
    #[error("Malformed script reply: {0}")]
    MalformedReply(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for redrate operations.
pub type Result<T> = std::result::Result<T, RedrateError>;
