//! Duplex connection to the remote audio model
//!
//! The transport hands the session two things: a `LiveConnection` for
//! fire-and-forget outbound audio, and a channel of `TransportEvent`s
//! (open / message / error / close) in the order the server produced them.

pub mod client;
pub mod messages;

pub use client::{LiveConnection, SessionSetup, Transport, TransportEvent, WebSocketTransport};
pub use messages::{RealtimeInputMessage, ServerMessage, SetupMessage};
