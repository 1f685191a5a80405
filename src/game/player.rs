//! Player handle the agent notifies.
//!
//! The host game owns the real player object and usually requires chat
//! delivery on its own thread. `ChannelPlayer` marshals every notification
//! over an mpsc channel so the host can drain it wherever it needs to.

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

/// The game-side identity an agent is bound to.
pub trait Player: Send + Sync {
    /// Stable identity used as the settings key.
    fn name(&self) -> &str;

    /// Name currently shown in game chat.
    fn display_name(&self) -> String;

    fn set_display_name(&self, name: &str);

    /// Deliver one chat line to the player. Must not block.
    fn send_message(&self, text: &str);
}

/// A chat line addressed to a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub player: String,
    pub text: String,
}

/// Player handle that forwards notifications to the host over a channel.
pub struct ChannelPlayer {
    name: String,
    display_name: RwLock<String>,
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelPlayer {
    /// Create a player whose display name starts out equal to its name.
    pub fn new(name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let player = Self {
            display_name: RwLock::new(name.clone()),
            name,
            tx,
        };
        (player, rx)
    }
}

impl Player for ChannelPlayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> String {
        self.display_name.read().clone()
    }

    fn set_display_name(&self, name: &str) {
        *self.display_name.write() = name.to_string();
    }

    fn send_message(&self, text: &str) {
        let notification = Notification {
            player: self.name.clone(),
            text: text.to_string(),
        };
        if self.tx.send(notification).is_err() {
            debug!("Dropping notification for '{}': host receiver closed", self.name);
        }
    }
}
