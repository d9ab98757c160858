//! Session error types.

use thiserror::Error;

/// Errors surfaced by session operations.
///
/// Server-side rejections that arrive as well-formed error payloads are not
/// represented here; they are decoded into the caller's error type instead
/// (see [`Decoded::ErrorPayload`](crate::Decoded::ErrorPayload)).
#[derive(Debug, Error)]
pub enum Error {
    /// The request could not reach the server or the connection failed.
    #[error("HTTP error: {0}")]
    Transport(String),

    /// The target URL could not be built from its components.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The response payload matched neither the success nor the error schema.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request body or a header could not be encoded.
    #[error("Encode error: {0}")]
    Encode(String),

    /// The anti-forgery token could not be obtained.
    #[error("Token fetch failed: {0}")]
    TokenFetch(String),

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// A queued task panicked or was aborted by the runtime.
    #[error("Task failed: {0}")]
    Task(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] quire_config::ConfigError),
}

impl Error {
    /// Check if this is a transport-level failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Check if this is a decode failure.
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode(_))
    }

    /// Check if the operation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::InvalidUrl(e.to_string())
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;
