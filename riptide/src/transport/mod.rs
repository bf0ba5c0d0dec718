//! The transport seam.
//!
//! A [`Transport`] is an ordered duplex stream of frames. The client asks it
//! to connect, disconnect and send; the transport reports back through the
//! [`TransportEvents`] sink it receives on `connect`:
//!
//! | Callback   | Sink method          | Client reaction                        |
//! |------------|----------------------|----------------------------------------|
//! | on open    | [`opened`]           | `Connected`, connect hook              |
//! | on message | [`message`]          | decode and route                       |
//! | on close   | [`closed`]           | cancel pending, disconnect hook        |
//! | on error   | [`errored`]          | cancel pending, error + disconnect hook|
//!
//! Events must be emitted in the order they happen on the wire, `opened`
//! first. Dropping the sink without calling `closed` counts as a close.
//!
//! [`opened`]: TransportEvents::opened
//! [`message`]: TransportEvents::message
//! [`closed`]: TransportEvents::closed
//! [`errored`]: TransportEvents::errored

mod error;
mod memory;
mod tcp;

pub use error::TransportError;
pub use memory::{MemoryPeer, MemoryTransport};
pub use tcp::{TcpConfig, TcpTransport};

use async_trait::async_trait;
use tokio::sync::mpsc;

/// One callback from a transport to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is open.
    Opened,
    /// One complete inbound frame.
    Message(Vec<u8>),
    /// The connection closed.
    Closed(String),
    /// The connection failed.
    Error(TransportError),
}

/// Sink through which a transport reports events for one connection.
///
/// Each method returns false once the client has stopped listening, which a
/// transport may use to stop reading.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportEvents {
    /// Create a sink and the receiver the client drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report that the connection opened.
    pub fn opened(&self) -> bool {
        self.emit(TransportEvent::Opened)
    }

    /// Deliver one inbound frame.
    pub fn message(&self, frame: Vec<u8>) -> bool {
        self.emit(TransportEvent::Message(frame))
    }

    /// Report that the connection closed.
    pub fn closed(&self, reason: impl Into<String>) -> bool {
        self.emit(TransportEvent::Closed(reason.into()))
    }

    /// Report that the connection failed.
    pub fn errored(&self, error: TransportError) -> bool {
        self.emit(TransportEvent::Error(error))
    }

    /// Whether the client stopped listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// An ordered duplex frame stream to one remote endpoint.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a connection to `endpoint`, reporting its events to `events`.
    ///
    /// On success the transport must emit `opened` before any `message`.
    async fn connect(&self, endpoint: &str, events: TransportEvents) -> Result<(), TransportError>;

    /// Close the current connection, if any. Idempotent.
    async fn disconnect(&self);

    /// Queue one frame for sending.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::NotConnected` when no connection is open.
    fn send(&self, frame: Vec<u8>) -> Result<(), TransportError>;
}
