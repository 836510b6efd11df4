//! Error types for skua-client.
//!
//! Two surfaces, kept deliberately separate:
//!
//! - [`Error`] covers everything the transport can do wrong (URL resolution,
//!   connect, TLS, send, receive).
//! - [`AcquireError`] is the pool's admission surface and is a closed set:
//!   `Timeout`, `Shutdown`, `CircuitOpen`, `InternalError`. No other value
//!   ever leaves `ConnectionPool::acquire`.

use thiserror::Error;

/// Result type for transport and client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by connections and request preparation.
#[derive(Error, Debug)]
pub enum Error {
    /// The URL is malformed, relative without a base, or not http(s).
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// DNS resolution or TCP connect failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The TLS handshake failed.
    #[error("tls handshake failed: {0}")]
    TlsHandshakeFailed(String),

    /// The operation timed out.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Writing the request failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Reading the response failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// The peer sent bytes that are not valid HTTP/1.1.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The connection is closed and cannot carry a request.
    #[error("connection closed")]
    ConnectionClosed,

    /// Underlying I/O error outside the send/receive phases.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<skua_http::Error> for Error {
    fn from(err: skua_http::Error) -> Self {
        match err {
            skua_http::Error::InvalidUrl(msg) => Error::InvalidUrl(msg),
            skua_http::Error::Protocol(msg) => Error::Protocol(msg),
            oversized @ skua_http::Error::HeadTooLarge(_) => Error::Protocol(oversized.to_string()),
        }
    }
}

/// Ways a pool acquisition can fail.
///
/// This is the complete set; see the variant docs for how callers should
/// react.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquireError {
    /// The wait exceeded the caller's deadline. Retrying may succeed.
    #[error("acquire timed out")]
    Timeout,

    /// The pool is shut down; every future call fails the same way.
    #[error("pool is shut down")]
    Shutdown,

    /// The endpoint's circuit breaker is open; back off before retrying.
    #[error("circuit breaker open for endpoint")]
    CircuitOpen,

    /// Scheduler anomaly inside the pool. Rare; treat the pool as degraded.
    #[error("internal pool error")]
    InternalError,
}
