//! Error types for sidecar-bridge.

use thiserror::Error;

use crate::codec::RemoteError;

/// Main error type for all bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (configuration loading only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Call could not be represented on the wire (e.g. payload too large).
    #[error("Encode error: {0}")]
    Encode(String),

    /// Protocol error (invalid frame, wrong flags, malformed reply, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A reply arrived for an id nobody is waiting on.
    #[error("Orphan reply for call {0}")]
    OrphanReply(u64),

    /// A pending slot is already registered for this id.
    #[error("Call id {0} is already registered")]
    IdCollision(u64),

    /// The worker reported that the operation failed.
    #[error("Remote error: {0}")]
    Remote(RemoteError),

    /// No reply arrived within the call timeout.
    #[error("Call {id} timed out after {elapsed_ms}ms")]
    Timeout {
        /// Id of the abandoned call.
        id: u64,
        /// Configured timeout in milliseconds.
        elapsed_ms: u64,
    },

    /// The pending slot was cancelled before a reply arrived.
    #[error("Call {0} was cancelled")]
    Cancelled(u64),

    /// Connection closed (EOF, write failure, or explicit close).
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Backpressure timeout - write queue full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// True for errors that are broadcast to every pending call on a connection.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, BridgeError::ConnectionClosed(_) | BridgeError::Io(_))
    }

    /// The remote error descriptor, if the worker reported a failure.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            BridgeError::Remote(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;
