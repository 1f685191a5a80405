//! IRCTransport - per-player IRC sessions for game servers
//!
//! Every player gets an `IrcAgent` that keeps one IRC connection alive on
//! their behalf, relays channel traffic into game chat and sends the
//! player's chat back out.

pub mod agent;
pub mod common;
pub mod config;
pub mod game;
pub mod protocol;

pub use agent::{AgentTasks, IrcAgent};
pub use config::Config;
