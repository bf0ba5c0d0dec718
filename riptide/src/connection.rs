//! Connection state and its transitions.
//!
//! ```text
//!                 connect()               transport opened
//!  Disconnected ─────────────► Connecting ─────────────────► Connected
//!       ▲                          │                             │
//!       └──────────────────────────┴─────────────────────────────┘
//!            close / error / disconnect()   (cancels all pending)
//! ```
//!
//! Each `connect()` starts a new epoch. Transitions carry the epoch they
//! belong to, so events from an earlier connection's delivery task can never
//! move the state of a later connection.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

/// Where the connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; every pending request has been failed.
    Disconnected,
    /// `connect()` is in progress; the transport has not opened yet.
    Connecting,
    /// The transport is open.
    Connected,
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The caller invoked `disconnect()`.
    Requested,
    /// The transport reported a close.
    Closed(String),
    /// The transport reported an error.
    TransportError(String),
    /// The transport failed to open.
    ConnectFailed(String),
    /// The transport dropped its event sink without reporting a close.
    TransportDropped,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Requested => write!(f, "disconnect requested"),
            DisconnectReason::Closed(reason) => write!(f, "closed: {}", reason),
            DisconnectReason::TransportError(err) => write!(f, "transport error: {}", err),
            DisconnectReason::ConnectFailed(err) => write!(f, "connect failed: {}", err),
            DisconnectReason::TransportDropped => write!(f, "transport dropped"),
        }
    }
}

/// Tracks the connection state and the current epoch.
pub(crate) struct ConnectionTracker {
    state: watch::Sender<ConnectionState>,
    epoch: AtomicU64,
}

impl ConnectionTracker {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state,
            epoch: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// `Disconnected → Connecting`. Returns the new epoch, or `None` if a
    /// connection is already open or opening.
    pub(crate) fn begin_connect(&self) -> Option<u64> {
        let mut started = None;
        self.state.send_if_modified(|state| {
            if *state != ConnectionState::Disconnected {
                return false;
            }
            *state = ConnectionState::Connecting;
            started = Some(self.epoch.fetch_add(1, Ordering::SeqCst) + 1);
            true
        });
        started
    }

    /// `Connecting → Connected` for `epoch`. Returns whether it happened.
    pub(crate) fn mark_connected(&self, epoch: u64) -> bool {
        self.state.send_if_modified(|state| {
            if self.epoch() != epoch || *state != ConnectionState::Connecting {
                return false;
            }
            *state = ConnectionState::Connected;
            true
        })
    }

    /// Any live state → `Disconnected` for `epoch`.
    ///
    /// Returns the state that was left, or `None` if `epoch` is stale or the
    /// connection was already down. Exactly one caller wins each transition.
    pub(crate) fn mark_disconnected(&self, epoch: u64) -> Option<ConnectionState> {
        let mut previous = None;
        self.state.send_if_modified(|state| {
            if self.epoch() != epoch || *state == ConnectionState::Disconnected {
                return false;
            }
            previous = Some(*state);
            *state = ConnectionState::Disconnected;
            true
        });
        previous
    }

    /// Whether `epoch` is current and not yet disconnected.
    pub(crate) fn is_live(&self, epoch: u64) -> bool {
        self.epoch() == epoch && self.state() != ConnectionState::Disconnected
    }
}
