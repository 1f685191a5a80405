//! Game-facing side of the bridge.
//!
//! This module contains:
//! - Color token translation between IRC and game chat
//! - Notification formatting with placeholder substitution
//! - The player handle notifications are delivered through

pub mod colors;
pub mod formatter;
pub mod player;

// Re-export commonly used types
pub use formatter::{FormatContext, MessageFormatter, NotificationFormats};
pub use player::{ChannelPlayer, Notification, Player};
