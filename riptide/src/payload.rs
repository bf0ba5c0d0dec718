//! The application payload contract.
//!
//! Riptide never looks inside a payload body. It only needs to know which
//! variant a payload is ([`Payload::kind`]) and whether that variant is the
//! server's error reply ([`Payload::remote_error`]). The variant catalogue
//! itself belongs to the application, usually as a serde-tagged enum:
//!
//! ```rust
//! use riptide::{Payload, RemoteError};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! #[serde(rename_all = "snake_case")]
//! enum Realtime {
//!     Ping {},
//!     Pong {},
//!     Error(RemoteError),
//! }
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum RealtimeKind { Ping, Pong, Error }
//!
//! impl Payload for Realtime {
//!     type Kind = RealtimeKind;
//!
//!     fn kind(&self) -> RealtimeKind {
//!         match self {
//!             Realtime::Ping {} => RealtimeKind::Ping,
//!             Realtime::Pong {} => RealtimeKind::Pong,
//!             Realtime::Error(_) => RealtimeKind::Error,
//!         }
//!     }
//!
//!     fn remote_error(&self) -> Option<&RemoteError> {
//!         match self {
//!             Realtime::Error(err) => Some(err),
//!             _ => None,
//!         }
//!     }
//! }
//! ```

use std::fmt;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A tagged message body carried inside an [`Envelope`](crate::Envelope).
pub trait Payload: Serialize + DeserializeOwned + fmt::Debug + Send + 'static {
    /// Discriminant naming each variant of the payload.
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// The variant this payload is.
    fn kind(&self) -> Self::Kind;

    /// The error body, if this payload is the server's error variant.
    fn remote_error(&self) -> Option<&RemoteError>;
}

/// Body of the server's error variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Application-level status code.
    pub code: i32,
    /// Human-readable description.
    pub message: String,
}

impl RemoteError {
    /// Create an error body.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {}: {}", self.code, self.message)
    }
}

/// What a pending request is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected<K> {
    /// A response of exactly this kind.
    Kind(K),
    /// Any non-error response, treated as an acknowledgement.
    NoValue,
}

impl<K: fmt::Debug> Expected<K> {
    /// Name used in logs and mismatch errors.
    pub fn describe(&self) -> String {
        match self {
            Expected::Kind(kind) => format!("{:?}", kind),
            Expected::NoValue => "no value".to_string(),
        }
    }
}

/// Successful outcome of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<P> {
    /// The response payload matched the expected kind.
    Payload(P),
    /// A no-value request was acknowledged.
    Ack,
}

impl<P> Reply<P> {
    /// The payload, or `None` for an acknowledgement.
    pub fn into_payload(self) -> Option<P> {
        match self {
            Reply::Payload(payload) => Some(payload),
            Reply::Ack => None,
        }
    }

    /// Whether this reply is a bare acknowledgement.
    pub fn is_ack(&self) -> bool {
        matches!(self, Reply::Ack)
    }
}
