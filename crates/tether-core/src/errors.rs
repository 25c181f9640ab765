//! Error hierarchy for the connection manager.
//!
//! - [`ConnectionError`]: failures surfaced to `connect` callers
//! - [`TransportError`]: failures raised by a transport implementation
//!
//! Disconnection is not an error: `send` on a closed link reports through
//! its return value, never through these types.

use thiserror::Error;

/// Errors raised by the transport layer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The transport could not establish a link.
    #[error("connect failed: {0}")]
    Connect(String),
    /// A frame could not be written to the link.
    #[error("send failed: {0}")]
    Send(String),
    /// The peer violated the wire protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The link is already closed.
    #[error("link closed")]
    Closed,
}

/// Errors returned by manager operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The connection table is full even after an idle sweep.
    #[error("connection limit reached ({max} connections)")]
    CapacityExceeded {
        /// The configured ceiling.
        max: usize,
    },

    /// No open event arrived within the connect timeout.
    #[error("connection '{id}' did not open within {timeout_ms}ms")]
    ConnectTimeout {
        /// Connection that timed out.
        id: String,
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// The transport reported a failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A pending connect was superseded by an explicit close.
    #[error("connection '{id}' was closed before it opened")]
    Cancelled {
        /// Connection whose connect was cancelled.
        id: String,
    },

    /// Reconnect attempts ran out after an unexpected close.
    #[error("connection '{id}' gave up after {attempts} reconnect attempts")]
    ReconnectExhausted {
        /// Connection that was dropped.
        id: String,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// The supplied configuration was rejected.
    #[error("invalid connection config: {0}")]
    InvalidConfig(String),
}

impl ConnectionError {
    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::ConnectTimeout { .. } => "CONNECT_TIMEOUT",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Cancelled { .. } => "CANCELLED",
            Self::ReconnectExhausted { .. } => "RECONNECT_EXHAUSTED",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }

    /// Whether a caller can reasonably try the same `connect` again.
    ///
    /// The manager itself never retries these; the hint is for callers.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout { .. } | Self::Transport(_) | Self::CapacityExceeded { .. }
        )
    }
}

/// Result type for manager operations.
pub type Result<T> = std::result::Result<T, ConnectionError>;
