//! Memoria error types

use thiserror::Error;

/// Memoria error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cryptographic error (key material, cipher setup)
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// A stored token could not be decrypted
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// Entity is absent or not visible to the caller
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entity already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Caller identity is missing or not allowed
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Remote model call failed or timed out
    #[error("Remote model unavailable: {0}")]
    RemoteUnavailable(String),

    /// Remote model answered with something that could not be parsed
    #[error("Unparsable model response: {0}")]
    UnparsableResponse(String),

    /// A folder name outside the taxonomy
    #[error("Invalid taxonomy value: {0}")]
    InvalidTaxonomyValue(String),

    /// Persistence backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// HTTP gateway error (bind, serve)
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

/// Result type alias for Memoria operations
pub type Result<T> = std::result::Result<T, Error>;
