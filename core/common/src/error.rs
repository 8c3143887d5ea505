//! Common error types for drivemerge.

use thiserror::Error;

/// Top-level error type for drivemerge operations.
///
/// Every stage fails fast and hands the error to its immediate caller.
/// Nothing in the library crates retries.
#[derive(Debug, Error)]
pub enum Error {
    /// No credential, an expired credential, or a refused consent.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The storage provider answered with a non-success status or the
    /// request could not be delivered.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A document buffer is not a well-formed PDF.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The host environment refused a save (disk full, permissions, ...).
    #[error("Environment error: {0}")]
    Environment(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
