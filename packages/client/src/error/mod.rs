//! Error taxonomy for the client engine.
//!
//! Every failure surfaces through the `Result` of the call that triggered it;
//! nothing is swallowed. Errors that leave a connection's framing state
//! ambiguous (timeouts, protocol violations, oversize aborts) always close
//! the connection instead of returning it to the pool.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// A `Result` alias where the `Err` case is [`HttpError`].
pub type Result<T> = std::result::Result<T, HttpError>;

/// Errors produced by the HTTP client.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The request was rejected before any network I/O (bad scheme, bad URL,
    /// unserializable body).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// DNS resolution, TCP connect, or TLS handshake failure.
    #[error("connect error: {message}")]
    Connect {
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    /// The per-request timeout elapsed before the exchange completed.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// A buffered response body exceeded the configured cap. The exchange is
    /// aborted and the connection closed; the body is never truncated.
    #[error("response body exceeded the configured limit of {limit} bytes")]
    ContentTooLarge { limit: usize },

    /// The redirect chain grew past the configured hop limit.
    #[error("too many redirects (limit {0})")]
    TooManyRedirects(u32),

    /// Malformed status line, headers, or chunk framing from the peer.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The caller cancelled the request before it completed.
    #[error("request cancelled")]
    Cancelled,

    /// The pool was saturated and the configured acquire wait elapsed.
    #[error("timed out waiting for a pooled connection")]
    QueueTimeout,

    /// The peer closed the connection mid-exchange. Idle connections closed
    /// by the peer are replaced silently by the pool and never surface here.
    #[error("connection closed by peer")]
    ClosedByPeer,

    /// Transport-level I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl HttpError {
    pub(crate) fn invalid_request(message: impl Into<String>) -> Self {
        HttpError::InvalidRequest(message.into())
    }

    pub(crate) fn connect(message: impl Into<String>) -> Self {
        HttpError::Connect {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn connect_io(message: impl Into<String>, source: io::Error) -> Self {
        HttpError::Connect {
            message: message.into(),
            source: Some(source),
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        HttpError::Protocol(message.into())
    }

    /// True for connect-phase failures.
    #[must_use]
    pub fn is_connect(&self) -> bool {
        matches!(self, HttpError::Connect { .. })
    }

    /// True when the per-request timeout elapsed.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, HttpError::Timeout(_))
    }

    /// True when a buffered body hit the size cap.
    #[must_use]
    pub fn is_content_too_large(&self) -> bool {
        matches!(self, HttpError::ContentTooLarge { .. })
    }
}
