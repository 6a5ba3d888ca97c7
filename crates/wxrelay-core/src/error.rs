//! Error types for `wxrelay` core library.

use thiserror::Error;

/// Result type alias using `wxrelay` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `wxrelay` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payload is valid JSON but not an object
    #[error("Payload is not a JSON object")]
    NotAnObject,

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
