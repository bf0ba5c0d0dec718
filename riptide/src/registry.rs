//! Pending request bookkeeping.
//!
//! The [`CorrelationRegistry`] owns the correlation id allocator and the map
//! from in-flight id to the [`PendingRequest`] waiting on it.
//!
//! # Architecture
//!
//! ```text
//! Request Flow:
//!   1. register(expected) allocates an id and a oneshot pair
//!   2. PendingRequest (holding the sender) goes into the map
//!   3. Caller encodes + sends, then awaits the receiver
//!
//! Response Flow:
//!   4. Delivery task decodes a frame with a correlation id
//!   5. resolve(id, payload) removes the entry under the lock
//!   6. Outside the lock, the entry settles against its expectation
//!   7. oneshot fires, the waiting caller wakes
//!
//! Disconnect Flow:
//!   4. cancel_all(reason) drains the whole map under the lock
//!   5. Every drained entry fails with ConnectionClosed
//! ```
//!
//! The id counter and the map share one lock, so allocation, resolution and
//! cancellation never interleave. Completion always happens after the entry
//! has been moved out of the map, which makes completion exactly-once by
//! ownership.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::ClientError;
use crate::payload::{Expected, Payload, Reply};

/// Value delivered to a waiting caller.
pub type Completion<P> = Result<Reply<P>, ClientError>;

/// Client-assigned token linking a request to its response.
///
/// On the wire the id is its decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// Wrap a raw id.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(CorrelationId)
    }
}

/// How a call to [`CorrelationRegistry::resolve`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The caller received a payload or an acknowledgement.
    Resolved,
    /// The caller received the server's error.
    RemoteError,
    /// The caller received a protocol mismatch error.
    Mismatch,
    /// No request with that id was pending.
    Orphan,
}

/// State for one request awaiting its response.
///
/// # Lifecycle
///
/// 1. **Created**: by [`CorrelationRegistry::register`]
/// 2. **Pending**: stored in the registry map
/// 3. **Completed**: by resolution, explicit failure, or cancellation;
///    `complete` consumes the entry so it cannot run twice
pub struct PendingRequest<P: Payload> {
    id: CorrelationId,
    expected: Expected<P::Kind>,
    sender: oneshot::Sender<Completion<P>>,
    start_time: Instant,
}

impl<P: Payload> PendingRequest<P> {
    fn new(
        id: CorrelationId,
        expected: Expected<P::Kind>,
        sender: oneshot::Sender<Completion<P>>,
    ) -> Self {
        Self {
            id,
            expected,
            sender,
            start_time: Instant::now(),
        }
    }

    /// The correlation id.
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    /// What this request is waiting for.
    pub fn expected(&self) -> Expected<P::Kind> {
        self.expected
    }

    /// Time since the request was registered.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Deliver a result to the waiting caller.
    pub fn complete(self, result: Completion<P>) {
        let id = self.id;
        let elapsed = self.elapsed();
        match self.sender.send(result) {
            Ok(()) => {
                tracing::debug!(correlation_id = %id, ?elapsed, "pending request completed");
            }
            Err(_) => {
                tracing::warn!(
                    correlation_id = %id,
                    "pending request completed but the caller is gone"
                );
            }
        }
    }

    /// Settle this request against a response payload.
    ///
    /// Error variants always fail the caller. A matching kind delivers the
    /// payload. A no-value expectation accepts any non-error payload as an
    /// acknowledgement. Anything else is a protocol mismatch.
    pub fn settle(self, payload: P) -> ResolveOutcome {
        if let Some(err) = payload.remote_error() {
            let error = ClientError::Remote {
                code: err.code,
                message: err.message.clone(),
            };
            self.complete(Err(error));
            return ResolveOutcome::RemoteError;
        }

        let got = payload.kind();
        match self.expected {
            Expected::Kind(kind) if kind == got => {
                self.complete(Ok(Reply::Payload(payload)));
                ResolveOutcome::Resolved
            }
            Expected::NoValue => {
                self.complete(Ok(Reply::Ack));
                ResolveOutcome::Resolved
            }
            Expected::Kind(_) => {
                let expected = self.expected.describe();
                let got = format!("{:?}", got);
                tracing::warn!(
                    correlation_id = %self.id,
                    %expected,
                    %got,
                    "response kind does not match pending request"
                );
                self.complete(Err(ClientError::ProtocolMismatch { expected, got }));
                ResolveOutcome::Mismatch
            }
        }
    }
}

impl<P: Payload> fmt::Debug for PendingRequest<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("expected", &self.expected)
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

struct RegistryState<P: Payload> {
    next_id: u64,
    pending: HashMap<CorrelationId, PendingRequest<P>>,
}

impl<P: Payload> RegistryState<P> {
    /// Next id that is not currently pending. Skips 0 on wraparound.
    fn allocate(&mut self) -> CorrelationId {
        loop {
            let candidate = CorrelationId(self.next_id);
            self.next_id = self.next_id.wrapping_add(1).max(1);
            if !self.pending.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

/// Map of in-flight correlation ids to their pending completions.
pub struct CorrelationRegistry<P: Payload> {
    state: Mutex<RegistryState<P>>,
}

impl<P: Payload> CorrelationRegistry<P> {
    /// Create an empty registry whose first id is 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Create an empty registry whose first id is `first_id` (0 is bumped to 1).
    pub fn starting_at(first_id: u64) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                next_id: first_id.max(1),
                pending: HashMap::new(),
            }),
        }
    }

    /// Allocate an id and register a pending request for it.
    pub fn register(
        &self,
        expected: Expected<P::Kind>,
    ) -> (CorrelationId, oneshot::Receiver<Completion<P>>) {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock();
        let id = state.allocate();
        state.pending.insert(id, PendingRequest::new(id, expected, tx));
        tracing::debug!(correlation_id = %id, expected = %expected.describe(), "registered pending request");
        (id, rx)
    }

    /// Complete the request waiting on `id` with a response payload.
    ///
    /// An unknown id is logged as an orphan response and otherwise ignored.
    pub fn resolve(&self, id: CorrelationId, payload: P) -> ResolveOutcome {
        let entry = self.state.lock().pending.remove(&id);
        match entry {
            Some(pending) => pending.settle(payload),
            None => {
                tracing::warn!(
                    correlation_id = %id,
                    kind = ?payload.kind(),
                    "orphan response: no pending request"
                );
                ResolveOutcome::Orphan
            }
        }
    }

    /// Fail the request waiting on `id`. Returns false if it was not pending.
    pub fn fail(&self, id: CorrelationId, error: ClientError) -> bool {
        let entry = self.state.lock().pending.remove(&id);
        match entry {
            Some(pending) => {
                tracing::debug!(correlation_id = %id, %error, "failing pending request");
                pending.complete(Err(error));
                true
            }
            None => false,
        }
    }

    /// Drop the request waiting on `id` without completing it.
    ///
    /// Used when the caller stopped waiting; a late response for the id
    /// becomes an orphan.
    pub fn forget(&self, id: CorrelationId) -> bool {
        self.state.lock().pending.remove(&id).is_some()
    }

    /// Fail every pending request with `ConnectionClosed` and clear the map.
    ///
    /// Returns the number of requests failed.
    pub fn cancel_all(&self, reason: &str) -> usize {
        let drained: Vec<PendingRequest<P>> = {
            let mut state = self.state.lock();
            state.pending.drain().map(|(_, pending)| pending).collect()
        };

        let count = drained.len();
        for pending in drained {
            pending.complete(Err(ClientError::ConnectionClosed {
                reason: reason.to_string(),
            }));
        }

        if count > 0 {
            tracing::debug!(count, reason, "cancelled pending requests");
        }
        count
    }

    /// Number of requests currently pending.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether a request with `id` is pending.
    pub fn is_pending(&self, id: CorrelationId) -> bool {
        self.state.lock().pending.contains_key(&id)
    }
}

impl<P: Payload> Default for CorrelationRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Payload> fmt::Debug for CorrelationRegistry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CorrelationRegistry")
            .field("next_id", &state.next_id)
            .field("pending", &state.pending.len())
            .finish()
    }
}
