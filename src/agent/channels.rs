//! Agent channel management.
//!
//! Groups the channels that connect the agent's event pump, its connection
//! manager and shutdown coordination.

use tokio::sync::{mpsc, watch};

use crate::protocol::irc::IrcEvent;

/// Channels for the event pump task.
pub struct PumpChannels {
    /// Receiver for transport events (pump listens).
    pub events_rx: mpsc::UnboundedReceiver<IrcEvent>,
    /// Receiver for shutdown signal.
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Channels for the connection manager task.
pub struct ManagerChannels {
    /// Sender handed to the transport on every connect.
    pub events_tx: mpsc::UnboundedSender<IrcEvent>,
    /// Receiver for reconnect requests (manager listens).
    pub reconnect_rx: mpsc::UnboundedReceiver<()>,
    /// Receiver for shutdown signal.
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Channels the agent itself keeps.
pub struct ControlChannels {
    /// Sender to request a reconnect after an unexpected disconnect.
    pub reconnect_tx: mpsc::UnboundedSender<()>,
    /// Sender to trigger shutdown.
    pub shutdown_tx: watch::Sender<bool>,
}

/// Bundle of all channels created for one agent.
pub struct ChannelBundle {
    pub pump: PumpChannels,
    pub manager: ManagerChannels,
    pub control: ControlChannels,
}

impl ChannelBundle {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (reconnect_tx, reconnect_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            pump: PumpChannels {
                events_rx,
                shutdown_rx: shutdown_rx.clone(),
            },
            manager: ManagerChannels {
                events_tx,
                reconnect_rx,
                shutdown_rx,
            },
            control: ControlChannels {
                reconnect_tx,
                shutdown_tx,
            },
        }
    }
}

impl Default for ChannelBundle {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve once shutdown has been signalled, or the signal can no longer arrive.
pub async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}
