//! Error types for skua-http.

use thiserror::Error;

/// Result type for skua-http operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while building requests or decoding responses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The URL is malformed, relative without a base, or not http(s).
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The peer sent bytes that are not valid HTTP/1.1.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The response head exceeded the configured size cap.
    #[error("response head exceeds {0} bytes")]
    HeadTooLarge(usize),
}

impl Error {
    /// Create an invalid-URL error.
    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::InvalidUrl(message.into())
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}
