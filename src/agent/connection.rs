//! Connection manager: connect attempts and reconnect policy.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::agent::channels::{shutdown_requested, ManagerChannels};
use crate::agent::{IrcAgent, QUIT_MESSAGE};
use crate::common::reconnect::ReconnectConfig;
use crate::game::formatter::UNAVAILABLE_NOTICE;

/// Drives the agent's transport until shutdown.
pub struct ConnectionManager {
    agent: Arc<IrcAgent>,
    channels: ManagerChannels,
    policy: ReconnectConfig,
}

impl ConnectionManager {
    pub fn new(agent: Arc<IrcAgent>, channels: ManagerChannels) -> Self {
        let policy = agent.config().reconnect.clone();
        Self {
            agent,
            channels,
            policy,
        }
    }

    /// Connect now, then once more for every reconnect request.
    pub async fn run(mut self) {
        loop {
            self.establish().await;

            tokio::select! {
                request = self.channels.reconnect_rx.recv() => {
                    if request.is_none() {
                        break;
                    }
                }
                _ = shutdown_requested(&mut self.channels.shutdown_rx) => break,
            }

            // Collapse requests that piled up while connecting
            while self.channels.reconnect_rx.try_recv().is_ok() {}
        }
        debug!(
            "Connection manager for '{}' stopped",
            self.agent.player().name()
        );
    }

    /// Try to connect until it works, the policy gives up or shutdown starts.
    ///
    /// Returns whether a session is up.
    pub async fn establish(&mut self) -> bool {
        let mut backoff = self.policy.backoff();
        let mut attempt = 0u32;
        let player_name = self.agent.player().name().to_string();

        loop {
            if self.agent.is_shutting_down() {
                debug!("Agent for '{}' shutting down, not connecting", player_name);
                return false;
            }

            attempt += 1;
            let params = self.agent.connect_params();
            match self
                .agent
                .transport()
                .connect(&params, self.channels.events_tx.clone())
                .await
            {
                Ok(()) => {
                    // Shutdown raced with the connect; it found nothing to disconnect
                    if self.agent.is_shutting_down() {
                        self.agent.transport().disconnect(Some(QUIT_MESSAGE));
                        return false;
                    }
                    info!(
                        "IRC session for '{}' established on attempt {}",
                        player_name, attempt
                    );
                    return true;
                }
                Err(e) => {
                    warn!(
                        "IRC connection attempt {} for '{}' failed: {}",
                        attempt, player_name, e
                    );
                }
            }

            let Some(delay) = backoff.next() else {
                error!(
                    "Giving up connecting '{}' after {} attempts",
                    player_name, attempt
                );
                self.agent.player().send_message(UNAVAILABLE_NOTICE);
                return false;
            };

            info!("Reconnecting in {:.1} seconds...", delay.as_secs_f64());
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_requested(&mut self.channels.shutdown_rx) => {
                    info!("Shutdown signal received during backoff");
                    return false;
                }
            }
        }
    }
}
