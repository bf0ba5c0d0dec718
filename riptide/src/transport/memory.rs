//! In-process transport for tests and embedding.
//!
//! [`MemoryTransport::pair`] returns the client side and a [`MemoryPeer`]
//! that plays the server: it sees every frame the client sends and can push
//! frames, close, fail or refuse connections on demand.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Transport, TransportError, TransportEvents};

struct Shared {
    events: Option<TransportEvents>,
    refuse: Option<String>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

/// Client side of an in-memory connection.
#[derive(Clone)]
pub struct MemoryTransport {
    shared: Arc<Mutex<Shared>>,
}

/// Server side of an in-memory connection.
pub struct MemoryPeer {
    shared: Arc<Mutex<Shared>>,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MemoryTransport {
    /// Create a connected transport/peer pair.
    pub fn pair() -> (MemoryTransport, MemoryPeer) {
        let (outbound, inbound) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(Shared {
            events: None,
            refuse: None,
            outbound,
        }));
        (
            MemoryTransport {
                shared: shared.clone(),
            },
            MemoryPeer { shared, inbound },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, endpoint: &str, events: TransportEvents) -> Result<(), TransportError> {
        let mut shared = self.shared.lock();
        if let Some(reason) = &shared.refuse {
            tracing::debug!(endpoint, %reason, "memory: refusing connection");
            return Err(TransportError::Refused {
                endpoint: endpoint.to_string(),
            });
        }
        if shared.events.is_some() {
            return Err(TransportError::AlreadyConnected);
        }
        events.opened();
        shared.events = Some(events);
        Ok(())
    }

    async fn disconnect(&self) {
        self.shared.lock().events = None;
    }

    fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        let shared = self.shared.lock();
        if shared.events.is_none() {
            return Err(TransportError::NotConnected);
        }
        shared
            .outbound
            .send(frame)
            .map_err(|_| TransportError::NotConnected)
    }
}

impl MemoryPeer {
    /// Wait for the next frame the client sent.
    ///
    /// Returns `None` once the transport side is gone.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.recv().await
    }

    /// The next frame the client sent, if one is queued.
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.try_recv().ok()
    }

    /// Deliver a frame to the client. Returns false when not connected.
    pub fn push(&self, frame: Vec<u8>) -> bool {
        match &self.shared.lock().events {
            Some(events) => events.message(frame),
            None => false,
        }
    }

    /// Close the connection from the server side.
    pub fn close(&self, reason: &str) -> bool {
        match self.shared.lock().events.take() {
            Some(events) => events.closed(reason),
            None => false,
        }
    }

    /// Fail the connection with a transport error.
    pub fn fail(&self, error: TransportError) -> bool {
        match self.shared.lock().events.take() {
            Some(events) => events.errored(error),
            None => false,
        }
    }

    /// Make future connects fail with the given reason, or accept them again.
    pub fn refuse_connections(&self, reason: Option<String>) {
        self.shared.lock().refuse = reason;
    }

    /// Whether a client connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.shared.lock().events.is_some()
    }
}
