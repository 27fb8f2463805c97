//! Event transport
//!
//! The wire protocol shared by client and server, and the client-side
//! WebSocket transport with reconnect and outbound queueing.

pub mod client;
pub mod protocol;

pub use client::{reconnect_delay, EventTransport, MAX_RECONNECT_ATTEMPTS};
pub use protocol::ControlMessage;
