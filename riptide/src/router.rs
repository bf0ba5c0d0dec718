//! Inbound frame routing.
//!
//! The [`Dispatcher`] turns one inbound frame into exactly one of:
//!
//! ```text
//! frame ──decode──► Envelope
//!   │                 │
//!   │ error           ├─ correlation id set ──► CorrelationRegistry::resolve
//!   ▼                 │
//! Malformed           └─ correlation id empty ─► HandlerSet push handler
//!  (error hook)                                   (or dropped when unset)
//! ```
//!
//! Nothing here can halt the delivery path: malformed frames, orphan
//! responses and unhandled pushes are logged and dropped.

use std::sync::Arc;

use crate::codec::{JsonCodec, MessageCodec};
use crate::envelope::EnvelopeCodec;
use crate::error::ClientError;
use crate::handlers::HandlerSet;
use crate::payload::Payload;
use crate::registry::{CorrelationId, CorrelationRegistry, ResolveOutcome};

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch<K> {
    /// The frame carried a correlation id and went to the registry.
    Correlated(ResolveOutcome),
    /// The frame was unsolicited and its push handler ran.
    Pushed(K),
    /// The frame was unsolicited and no handler was registered for its kind.
    Unhandled(K),
    /// The frame could not be decoded.
    Malformed,
}

/// Routes decoded frames to the registry or to push handlers.
pub struct Dispatcher<P: Payload, C: MessageCodec = JsonCodec> {
    registry: Arc<CorrelationRegistry<P>>,
    handlers: Arc<HandlerSet<P>>,
    codec: EnvelopeCodec<C>,
}

impl<P: Payload, C: MessageCodec> Dispatcher<P, C> {
    /// Create a dispatcher over a shared registry and handler set.
    pub fn new(
        registry: Arc<CorrelationRegistry<P>>,
        handlers: Arc<HandlerSet<P>>,
        codec: EnvelopeCodec<C>,
    ) -> Self {
        Self {
            registry,
            handlers,
            codec,
        }
    }

    /// Route one inbound frame.
    ///
    /// Must be called sequentially, in wire order.
    pub fn on_receive(&self, frame: &[u8]) -> Dispatch<P::Kind> {
        let envelope = match self.codec.decode::<P>(frame) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(len = frame.len(), error = %err, "dropping undecodable frame");
                self.handlers.fire_error(&ClientError::Decode(err));
                return Dispatch::Malformed;
            }
        };

        if envelope.is_unsolicited() {
            return self.route_push(envelope.payload);
        }

        match envelope.correlation_id.parse::<CorrelationId>() {
            Ok(id) => Dispatch::Correlated(self.registry.resolve(id, envelope.payload)),
            Err(_) => {
                tracing::warn!(
                    correlation_id = %envelope.correlation_id,
                    kind = ?envelope.payload.kind(),
                    "orphan response: correlation id was never issued by this client"
                );
                Dispatch::Correlated(ResolveOutcome::Orphan)
            }
        }
    }

    fn route_push(&self, payload: P) -> Dispatch<P::Kind> {
        let kind = payload.kind();
        if self.handlers.dispatch_push(payload) {
            tracing::trace!(?kind, "push delivered");
            Dispatch::Pushed(kind)
        } else {
            tracing::warn!(?kind, "dropping unhandled push");
            Dispatch::Unhandled(kind)
        }
    }
}
