//! Error types for transport operations.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in a transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No connection is open.
    #[error("not connected")]
    NotConnected,

    /// A connection is already open.
    #[error("already connected")]
    AlreadyConnected,

    /// The remote end refused the connection.
    #[error("connection refused by {endpoint}")]
    Refused {
        /// Endpoint that refused.
        endpoint: String,
    },

    /// Connecting took longer than the configured timeout.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// A frame exceeded the configured size limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Frame size in bytes.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        TransportError::Io(error.to_string())
    }
}
