//! IRC client protocol.
//!
//! Handles:
//! - Line parsing and framing
//! - Registration, nick negotiation and keepalive
//! - CTCP replies and NAMES accumulation

pub mod codec;
pub mod event;
pub mod message;
#[cfg(test)]
pub mod mock;
pub mod numerics;
pub mod session;
pub mod transport;

pub use event::IrcEvent;
pub use message::IrcMessage;
pub use transport::{ConnectParams, TcpTransport, Transport};
