//! Push and lifecycle handler slots.
//!
//! Every slot holds at most one handler. Registering replaces the previous
//! handler; clearing empties the slot. Handlers are cloned out of their slot
//! before being called, so a handler may re-register or clear slots
//! (including its own) without deadlocking.
//!
//! For fan-out, register one handler that forwards to your own list or a
//! broadcast channel.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::connection::DisconnectReason;
use crate::error::ClientError;
use crate::payload::Payload;

/// Handler for unsolicited payloads of one kind.
pub type PushHandler<P> = Arc<dyn Fn(P) + Send + Sync>;

/// Handler fired when the connection opens.
pub type ConnectHandler = Arc<dyn Fn() + Send + Sync>;

/// Handler fired when an open connection closes.
pub type DisconnectHandler = Arc<dyn Fn(&DisconnectReason) + Send + Sync>;

/// Handler fired for transport errors and undecodable frames.
pub type ErrorHandler = Arc<dyn Fn(&ClientError) + Send + Sync>;

struct Slot<F: ?Sized> {
    handler: Mutex<Option<Arc<F>>>,
}

impl<F: ?Sized> Slot<F> {
    fn new() -> Self {
        Self {
            handler: Mutex::new(None),
        }
    }

    fn set(&self, handler: Arc<F>) {
        *self.handler.lock() = Some(handler);
    }

    fn clear(&self) -> bool {
        self.handler.lock().take().is_some()
    }

    fn get(&self) -> Option<Arc<F>> {
        self.handler.lock().clone()
    }
}

/// The full set of handlers a client dispatches to.
pub struct HandlerSet<P: Payload> {
    push: Mutex<HashMap<P::Kind, PushHandler<P>>>,
    connect: Slot<dyn Fn() + Send + Sync>,
    disconnect: Slot<dyn Fn(&DisconnectReason) + Send + Sync>,
    error: Slot<dyn Fn(&ClientError) + Send + Sync>,
}

impl<P: Payload> HandlerSet<P> {
    /// Create a set with every slot empty.
    pub fn new() -> Self {
        Self {
            push: Mutex::new(HashMap::new()),
            connect: Slot::new(),
            disconnect: Slot::new(),
            error: Slot::new(),
        }
    }

    /// Register the push handler for `kind`, replacing any previous one.
    pub fn set_push(&self, kind: P::Kind, handler: PushHandler<P>) {
        if self.push.lock().insert(kind, handler).is_some() {
            tracing::debug!(?kind, "replaced push handler");
        }
    }

    /// Remove the push handler for `kind`. Returns whether one was set.
    pub fn clear_push(&self, kind: P::Kind) -> bool {
        self.push.lock().remove(&kind).is_some()
    }

    /// Whether a push handler is registered for `kind`.
    pub fn has_push(&self, kind: P::Kind) -> bool {
        self.push.lock().contains_key(&kind)
    }

    /// Call the push handler for the payload's kind.
    ///
    /// Returns false, without side effects, when no handler is registered.
    pub fn dispatch_push(&self, payload: P) -> bool {
        let kind = payload.kind();
        let handler = self.push.lock().get(&kind).cloned();
        match handler {
            Some(handler) => {
                handler(payload);
                true
            }
            None => false,
        }
    }

    /// Register the connect handler.
    pub fn set_connect(&self, handler: ConnectHandler) {
        self.connect.set(handler);
    }

    /// Register the disconnect handler.
    pub fn set_disconnect(&self, handler: DisconnectHandler) {
        self.disconnect.set(handler);
    }

    /// Register the error handler.
    pub fn set_error(&self, handler: ErrorHandler) {
        self.error.set(handler);
    }

    /// Empty the connect slot.
    pub fn clear_connect(&self) -> bool {
        self.connect.clear()
    }

    /// Empty the disconnect slot.
    pub fn clear_disconnect(&self) -> bool {
        self.disconnect.clear()
    }

    /// Empty the error slot.
    pub fn clear_error(&self) -> bool {
        self.error.clear()
    }

    pub(crate) fn fire_connect(&self) {
        if let Some(handler) = self.connect.get() {
            handler();
        }
    }

    pub(crate) fn fire_disconnect(&self, reason: &DisconnectReason) {
        if let Some(handler) = self.disconnect.get() {
            handler(reason);
        }
    }

    pub(crate) fn fire_error(&self, error: &ClientError) {
        match self.error.get() {
            Some(handler) => handler(error),
            None => tracing::debug!(%error, "no error handler registered"),
        }
    }
}

impl<P: Payload> Default for HandlerSet<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Payload> fmt::Debug for HandlerSet<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<P::Kind> = self.push.lock().keys().copied().collect();
        f.debug_struct("HandlerSet")
            .field("push_kinds", &kinds)
            .field("connect", &self.connect.get().is_some())
            .field("disconnect", &self.disconnect.get().is_some())
            .field("error", &self.error.get().is_some())
            .finish()
    }
}
