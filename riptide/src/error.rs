//! Error types surfaced by the client.
//!
//! Request-scoped errors ([`ClientError::Remote`], [`ClientError::ProtocolMismatch`],
//! [`ClientError::Transport`] on send, [`ClientError::Encode`]) fail exactly one
//! request. [`ClientError::ConnectionClosed`] fails every request that was
//! pending when the connection dropped. [`ClientError::Decode`] never fails a
//! request; it only reaches the error hook.

use crate::envelope::WireError;
use crate::transport::TransportError;

/// Errors produced by the client and delivered to callers or the error hook.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// An inbound frame could not be decoded. The frame was dropped.
    #[error("failed to decode inbound frame: {0}")]
    Decode(WireError),

    /// An outbound payload could not be encoded.
    #[error("failed to encode outbound frame: {0}")]
    Encode(WireError),

    /// The server answered the request with its error variant.
    #[error("remote error {code}: {message}")]
    Remote {
        /// Application-level status code.
        code: i32,
        /// Human-readable description.
        message: String,
    },

    /// The server answered with a payload kind the request was not expecting.
    #[error("protocol mismatch: expected {expected}, got {got}")]
    ProtocolMismatch {
        /// Kind the request was waiting for.
        expected: String,
        /// Kind that arrived.
        got: String,
    },

    /// The connection closed while the request was pending.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Why the connection closed.
        reason: String,
    },

    /// The transport refused or failed an operation.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// `connect` was called while a connection was open or opening.
    #[error("client is already connected or connecting")]
    AlreadyConnected,
}

impl ClientError {
    /// Whether this error ends the connection rather than a single request.
    pub fn is_connection_scoped(&self) -> bool {
        matches!(self, ClientError::ConnectionClosed { .. })
    }
}
