//! The public request/notify surface.
//!
//! # Connection lifecycle
//!
//! ```text
//! connect()
//!   ├─ begin_connect()            Disconnected → Connecting, epoch += 1
//!   ├─ spawn deliver(epoch)       one task per connection, strict event order
//!   ├─ transport.connect()        error → Disconnected, cancel_all, on_error
//!   └─ wait until not Connecting
//!
//! deliver(epoch)
//!   Opened      → Connected, on_connect
//!   Message     → Dispatcher::on_receive
//!   Closed      → Disconnected, cancel_all, on_disconnect
//!   Error       → Disconnected, cancel_all, on_error, on_disconnect
//!   sink gone   → Disconnected, cancel_all, on_disconnect
//! ```
//!
//! Events tagged with an older epoch are discarded, so a slow delivery task
//! from a previous connection cannot touch the current one.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::codec::{JsonCodec, MessageCodec};
use crate::config::ClientConfig;
use crate::connection::{ConnectionState, ConnectionTracker, DisconnectReason};
use crate::envelope::{Envelope, EnvelopeCodec};
use crate::error::ClientError;
use crate::handlers::HandlerSet;
use crate::payload::{Expected, Payload, Reply};
use crate::registry::{CorrelationId, CorrelationRegistry};
use crate::router::Dispatcher;
use crate::transport::{Transport, TransportError, TransportEvent, TransportEvents};

struct ClientInner<P: Payload, T: Transport, C: MessageCodec> {
    config: ClientConfig,
    transport: T,
    codec: EnvelopeCodec<C>,
    registry: Arc<CorrelationRegistry<P>>,
    handlers: Arc<HandlerSet<P>>,
    dispatcher: Dispatcher<P, C>,
    connection: ConnectionTracker,
}

/// A correlating client over one duplex connection.
///
/// Cloning is cheap; clones share the connection, the pending requests and
/// the handlers.
pub struct Client<P: Payload, T: Transport, C: MessageCodec = JsonCodec> {
    inner: Arc<ClientInner<P, T, C>>,
}

impl<P: Payload, T: Transport, C: MessageCodec> Clone for Client<P, T, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: Payload, T: Transport> Client<P, T> {
    /// Create a client that encodes payload bodies as JSON.
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self::with_codec(transport, config, JsonCodec)
    }
}

impl<P: Payload, T: Transport, C: MessageCodec> Client<P, T, C> {
    /// Create a client with a custom body codec.
    pub fn with_codec(transport: T, config: ClientConfig, codec: C) -> Self {
        let codec = EnvelopeCodec::new(codec).with_max_frame_size(config.max_frame_size);
        let registry = Arc::new(CorrelationRegistry::new());
        let handlers = Arc::new(HandlerSet::new());
        let dispatcher = Dispatcher::new(registry.clone(), handlers.clone(), codec.clone());
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                codec,
                registry,
                handlers,
                dispatcher,
                connection: ConnectionTracker::new(),
            }),
        }
    }

    /// Open the connection to the configured endpoint.
    ///
    /// Resolves once the transport reports the connection open.
    ///
    /// # Errors
    ///
    /// - `AlreadyConnected` unless the client is `Disconnected`
    /// - `Transport` if the transport fails to connect
    /// - `ConnectionClosed` if the connection closed before it opened
    pub async fn connect(&self) -> Result<(), ClientError> {
        let inner = &self.inner;
        let Some(epoch) = inner.connection.begin_connect() else {
            return Err(ClientError::AlreadyConnected);
        };
        tracing::debug!(
            endpoint = %inner.config.endpoint,
            epoch,
            content_type = inner.codec.content_type(),
            "connecting"
        );

        let (events, rx) = TransportEvents::channel();
        let mut state = inner.connection.subscribe();
        tokio::spawn(deliver(inner.clone(), epoch, rx));

        if let Err(err) = inner.transport.connect(&inner.config.endpoint, events).await {
            tracing::warn!(endpoint = %inner.config.endpoint, error = %err, "connect failed");
            inner.handle_disconnect(epoch, DisconnectReason::ConnectFailed(err.to_string()));
            inner.handlers.fire_error(&ClientError::Transport(err.clone()));
            return Err(ClientError::Transport(err));
        }

        let reached = match state
            .wait_for(|state| *state != ConnectionState::Connecting)
            .await
        {
            Ok(state) => *state,
            Err(_) => ConnectionState::Disconnected,
        };

        if reached == ConnectionState::Connected && inner.connection.epoch() == epoch {
            tracing::info!(endpoint = %inner.config.endpoint, epoch, "connected");
            return Ok(());
        }

        // Disconnected while opening; the transport may still hold the socket.
        if inner.connection.epoch() == epoch {
            inner.transport.disconnect().await;
        }
        Err(ClientError::ConnectionClosed {
            reason: "connection closed before it opened".to_string(),
        })
    }

    /// Close the connection and fail every pending request.
    ///
    /// Does nothing when already disconnected.
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        inner.handle_disconnect(inner.connection.epoch(), DisconnectReason::Requested);
        inner.transport.disconnect().await;
    }

    /// Send `payload` and wait for the response correlated with it.
    ///
    /// Dropping the returned future before it resolves forgets the pending
    /// entry; a response that arrives later is logged as an orphan. Wrap the
    /// call in `tokio::time::timeout` to bound the wait.
    ///
    /// # Errors
    ///
    /// - `Encode` or `Transport` if the request could not be sent
    /// - `Remote` if the server answered with its error variant
    /// - `ProtocolMismatch` if the response kind does not satisfy `expected`
    /// - `ConnectionClosed` if the connection dropped first
    pub async fn request(
        &self,
        payload: P,
        expected: Expected<P::Kind>,
    ) -> Result<Reply<P>, ClientError> {
        let inner = &self.inner;
        let epoch = inner.connection.epoch();
        if !inner.connection.is_live(epoch) {
            return Err(ClientError::Transport(TransportError::NotConnected));
        }

        let (id, rx) = inner.registry.register(expected);
        let _forget = ForgetOnDrop {
            registry: &inner.registry,
            id,
        };

        let sent = inner
            .codec
            .encode(&Envelope::correlated(id.to_string(), payload))
            .map_err(ClientError::Encode)
            .and_then(|frame| inner.transport.send(frame).map_err(ClientError::Transport));
        match sent {
            Err(err) => {
                tracing::debug!(correlation_id = %id, error = %err, "request not sent");
                inner.registry.fail(id, err);
            }
            // A disconnect that marked the state after registration drains
            // this entry itself; one that marked it before is caught here.
            Ok(()) if !inner.connection.is_live(epoch) => {
                tracing::debug!(correlation_id = %id, epoch, "connection closed while sending");
                inner.registry.fail(
                    id,
                    ClientError::ConnectionClosed {
                        reason: "connection closed while sending".to_string(),
                    },
                );
            }
            Ok(()) => {}
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::ConnectionClosed {
                reason: "pending request dropped".to_string(),
            }),
        }
    }

    /// Send `payload` and wait for a response of exactly `kind`.
    pub async fn call(&self, payload: P, kind: P::Kind) -> Result<P, ClientError> {
        match self.request(payload, Expected::Kind(kind)).await? {
            Reply::Payload(payload) => Ok(payload),
            Reply::Ack => Err(ClientError::ProtocolMismatch {
                expected: Expected::Kind(kind).describe(),
                got: Expected::<P::Kind>::NoValue.describe(),
            }),
        }
    }

    /// Send `payload` and wait for any non-error response.
    pub async fn request_ack(&self, payload: P) -> Result<(), ClientError> {
        self.request(payload, Expected::NoValue).await.map(|_| ())
    }

    /// Send `payload` without a correlation id. Nothing waits for a reply.
    pub fn notify(&self, payload: P) -> Result<(), ClientError> {
        let kind = payload.kind();
        let frame = self
            .inner
            .codec
            .encode(&Envelope::unsolicited(payload))
            .map_err(ClientError::Encode)?;
        self.inner.transport.send(frame)?;
        tracing::trace!(?kind, "notification sent");
        Ok(())
    }

    /// Register the handler for unsolicited payloads of `kind`.
    ///
    /// Runs on the delivery task, in wire order; it must not block.
    pub fn on_push<F>(&self, kind: P::Kind, handler: F)
    where
        F: Fn(P) + Send + Sync + 'static,
    {
        self.inner.handlers.set_push(kind, Arc::new(handler));
    }

    /// Remove the push handler for `kind`.
    pub fn clear_push(&self, kind: P::Kind) -> bool {
        self.inner.handlers.clear_push(kind)
    }

    /// Register the handler fired when the connection opens.
    pub fn on_connect<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.handlers.set_connect(Arc::new(handler));
    }

    /// Register the handler fired when an open connection closes.
    pub fn on_disconnect<F>(&self, handler: F)
    where
        F: Fn(&DisconnectReason) + Send + Sync + 'static,
    {
        self.inner.handlers.set_disconnect(Arc::new(handler));
    }

    /// Register the handler fired for transport errors and undecodable frames.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&ClientError) + Send + Sync + 'static,
    {
        self.inner.handlers.set_error(Arc::new(handler));
    }

    /// Remove the connect handler.
    pub fn clear_connect(&self) -> bool {
        self.inner.handlers.clear_connect()
    }

    /// Remove the disconnect handler.
    pub fn clear_disconnect(&self) -> bool {
        self.inner.handlers.clear_disconnect()
    }

    /// Remove the error handler.
    pub fn clear_error(&self) -> bool {
        self.inner.handlers.clear_error()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Number of requests waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.inner.registry.pending_count()
    }

    /// The configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

impl<P: Payload, T: Transport, C: MessageCodec> ClientInner<P, T, C> {
    /// Move `epoch` to `Disconnected`, failing everything pending.
    ///
    /// The disconnect hook fires only when an open connection closed.
    fn handle_disconnect(&self, epoch: u64, reason: DisconnectReason) {
        let Some(previous) = self.connection.mark_disconnected(epoch) else {
            return;
        };
        let cancelled = self.registry.cancel_all(&reason.to_string());
        tracing::info!(%reason, cancelled, epoch, "disconnected");
        if previous == ConnectionState::Connected {
            self.handlers.fire_disconnect(&reason);
        }
    }

    fn handle_transport_error(&self, epoch: u64, error: TransportError) {
        tracing::error!(%error, epoch, "transport error");
        let reason = DisconnectReason::TransportError(error.to_string());
        let previous = self.connection.mark_disconnected(epoch);
        if previous.is_some() {
            self.registry.cancel_all(&reason.to_string());
        }
        self.handlers.fire_error(&ClientError::Transport(error));
        if previous == Some(ConnectionState::Connected) {
            self.handlers.fire_disconnect(&reason);
        }
    }
}

/// Delivery task for one connection epoch.
async fn deliver<P: Payload, T: Transport, C: MessageCodec>(
    inner: Arc<ClientInner<P, T, C>>,
    epoch: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        if !inner.connection.is_live(epoch) {
            tracing::debug!(epoch, "discarding events from a finished connection");
            return;
        }

        match event {
            TransportEvent::Opened => {
                if inner.connection.mark_connected(epoch) {
                    inner.handlers.fire_connect();
                }
            }
            TransportEvent::Message(frame) => {
                inner.dispatcher.on_receive(&frame);
            }
            TransportEvent::Closed(reason) => {
                inner.transport.disconnect().await;
                inner.handle_disconnect(epoch, DisconnectReason::Closed(reason));
                return;
            }
            TransportEvent::Error(error) => {
                inner.transport.disconnect().await;
                inner.handle_transport_error(epoch, error);
                return;
            }
        }
    }

    inner.handle_disconnect(epoch, DisconnectReason::TransportDropped);
}

/// Removes a request's pending entry if its future is dropped early.
struct ForgetOnDrop<'a, P: Payload> {
    registry: &'a CorrelationRegistry<P>,
    id: CorrelationId,
}

impl<P: Payload> Drop for ForgetOnDrop<'_, P> {
    fn drop(&mut self) {
        if self.registry.forget(self.id) {
            tracing::debug!(correlation_id = %self.id, "request abandoned before completion");
        }
    }
}
