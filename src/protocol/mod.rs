//! Wire protocols.

pub mod irc;
