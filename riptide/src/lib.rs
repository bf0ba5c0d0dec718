//! # Riptide
//!
//! Request/response correlation and push dispatch over one persistent duplex
//! connection.
//!
//! A [`Client`] multiplexes any number of in-flight requests over a single
//! ordered byte stream. Every outbound request carries a correlation id; every
//! inbound frame is either matched back to the caller waiting on that id or,
//! when it carries no id, handed to the push handler registered for its kind.
//! When the connection drops, every pending request fails at once.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Client: request / call / notify / on_push / lifecycle hooks  │
//! ├──────────────────────────────┬───────────────────────────────┤
//! │  CorrelationRegistry         │  HandlerSet                   │
//! │  • id allocation             │  • one push handler per kind  │
//! │  • pending completions       │  • connect/disconnect/error   │
//! ├──────────────────────────────┴───────────────────────────────┤
//! │  Dispatcher: decode → correlated? resolve : push             │
//! ├──────────────────────────────────────────────────────────────┤
//! │  EnvelopeCodec: [checksum][cid_len][cid][body]               │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Transport: TcpTransport | MemoryTransport | your own        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use riptide::{Client, ClientConfig, TcpTransport, TcpConfig};
//!
//! let client: Client<Realtime, _> =
//!     Client::new(TcpTransport::new(TcpConfig::default()), ClientConfig::new("127.0.0.1:7350"));
//!
//! client.on_push(RealtimeKind::ChannelMessage, |msg| println!("{msg:?}"));
//! client.connect().await?;
//!
//! let created = client.call(Realtime::MatchCreate(create), RealtimeKind::Match).await?;
//! client.request_ack(Realtime::MatchLeave(leave)).await?;
//! ```
//!
//! The payload catalogue is application-defined: implement [`Payload`] for an
//! enum whose variants are your message shapes, one of which carries a
//! [`RemoteError`].

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

/// Pluggable serialization of payload bodies.
pub mod codec;

/// Client configuration.
pub mod config;

/// Connection state tracking.
pub mod connection;

/// Binary envelope wire format.
pub mod envelope;

/// Error types surfaced to callers.
pub mod error;

/// Push and lifecycle handler slots.
pub mod handlers;

/// Application payload contract.
pub mod payload;

/// Pending request bookkeeping.
pub mod registry;

/// Inbound frame routing.
pub mod router;

/// Transport abstraction and bundled transports.
pub mod transport;

mod client;

#[cfg(test)]
pub(crate) mod fixtures;

pub use client::Client;
pub use codec::{CodecError, JsonCodec, MessageCodec};
pub use config::ClientConfig;
pub use connection::{ConnectionState, DisconnectReason};
pub use envelope::{Envelope, EnvelopeCodec, WireError, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE};
pub use error::ClientError;
pub use handlers::HandlerSet;
pub use payload::{Expected, Payload, RemoteError, Reply};
pub use registry::{Completion, CorrelationId, CorrelationRegistry, PendingRequest, ResolveOutcome};
pub use router::{Dispatch, Dispatcher};
pub use transport::{
    MemoryPeer, MemoryTransport, TcpConfig, TcpTransport, Transport, TransportError,
    TransportEvent, TransportEvents,
};
