//! Per-player IRC agent.
//!
//! One `IrcAgent` binds a player to one IRC session. It turns protocol events
//! into chat notifications for the player and exposes the outbound actions
//! the game side can take. Construction does no I/O; `start()` spawns the
//! event pump and the connection manager.
//!
//! ## Module Structure
//!
//! - `channels`: Channels between the agent and its tasks
//! - `connection`: Connect and reconnect policy (`ConnectionManager`)
//! - `settings`: Persisted per-player settings and stores

pub mod channels;
pub mod connection;
pub mod settings;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fancy_regex::Regex;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::common::error::SettingsResult;
use crate::config::Config;
use crate::game::colors;
use crate::game::formatter::{
    split_message, truncate_message, FormatContext, NotificationFormats, DISCONNECTED_NOTICE,
};
use crate::game::Player;
use crate::protocol::irc::codec::MAX_LINE_LENGTH;
use crate::protocol::irc::numerics::is_player_visible_error;
use crate::protocol::irc::{ConnectParams, IrcEvent, IrcMessage, Transport};

use channels::{shutdown_requested, ChannelBundle, ControlChannels, ManagerChannels, PumpChannels};
use connection::ConnectionManager;
pub use settings::{AgentSettings, JsonFileStore, MemoryStore, SettingsStore};

/// QUIT reason sent on shutdown.
pub const QUIT_MESSAGE: &str = "Leaving";

/// Room left for the `:nick!user@host ` prefix servers add when relaying.
const RELAY_PREFIX_RESERVE: usize = 100;

/// How long the pump keeps delivering events after shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(2);

/// Numeric error payload: optional own nick, subject, then the text.
const NUMERIC_PAYLOAD_PATTERN: &str = r"^(?:\S+ )?(\S+) :(.*)$";

/// Mutable per-session state.
#[derive(Debug)]
struct AgentState {
    /// Nick the server knows us by.
    nick: String,
    active_channel: Option<String>,
    settings: AgentSettings,
    /// No record existed in the store when the agent was created.
    settings_new: bool,
}

/// Handles of the tasks started by `IrcAgent::start`.
pub struct AgentTasks {
    pub pump: JoinHandle<()>,
    pub manager: JoinHandle<()>,
}

impl AgentTasks {
    /// Wait for both tasks to finish.
    pub async fn join(self) {
        if let Err(e) = self.pump.await {
            warn!("Event pump task failed: {}", e);
        }
        if let Err(e) = self.manager.await {
            warn!("Connection manager task failed: {}", e);
        }
    }
}

/// Bridge between one player and one IRC session.
pub struct IrcAgent {
    config: Arc<Config>,
    player: Arc<dyn Player>,
    store: Arc<dyn SettingsStore>,
    transport: Arc<dyn Transport>,
    formats: NotificationFormats,
    numeric_pattern: Regex,
    state: Mutex<AgentState>,
    shutting_down: AtomicBool,
    control: ControlChannels,
    /// Task channels, taken by `start()`.
    pending: Mutex<Option<(PumpChannels, ManagerChannels)>>,
}

impl IrcAgent {
    /// Create an agent, loading or deriving the player's settings.
    ///
    /// Fails only if the settings store cannot be read.
    pub fn new(
        config: Arc<Config>,
        player: Arc<dyn Player>,
        store: Arc<dyn SettingsStore>,
        transport: Arc<dyn Transport>,
    ) -> SettingsResult<Self> {
        let (settings, settings_new) = match store.find(player.name())? {
            Some(settings) => {
                info!(
                    "Player '{}' using persistent IRC nick '{}'",
                    player.name(),
                    settings.irc_nick
                );
                (settings, false)
            }
            None => {
                let nick = config.default_nick(player.name());
                debug!("Player '{}' gets default IRC nick '{}'", player.name(), nick);
                (AgentSettings::new(player.name(), nick), true)
            }
        };

        let bundle = ChannelBundle::new();
        let formats = NotificationFormats::from_config(config.formats.as_ref());

        Ok(Self {
            formats,
            numeric_pattern: Regex::new(NUMERIC_PAYLOAD_PATTERN)
                .expect("numeric payload pattern is valid"),
            state: Mutex::new(AgentState {
                nick: settings.irc_nick.clone(),
                active_channel: None,
                settings,
                settings_new,
            }),
            shutting_down: AtomicBool::new(false),
            control: bundle.control,
            pending: Mutex::new(Some((bundle.pump, bundle.manager))),
            config,
            player,
            store,
            transport,
        })
    }

    /// Spawn the event pump and the connection manager.
    ///
    /// Returns `None` if the agent was already started.
    pub fn start(self: &Arc<Self>) -> Option<AgentTasks> {
        let (pump_channels, manager_channels) = self.pending.lock().take()?;

        let pump = tokio::spawn(run_pump(self.clone(), pump_channels));
        let manager = tokio::spawn(ConnectionManager::new(self.clone(), manager_channels).run());

        Some(AgentTasks { pump, manager })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn player(&self) -> &Arc<dyn Player> {
        &self.player
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Nick currently in use on the network.
    pub fn nick(&self) -> String {
        self.state.lock().nick.clone()
    }

    pub fn active_channel(&self) -> Option<String> {
        self.state.lock().active_channel.clone()
    }

    pub fn settings(&self) -> AgentSettings {
        self.state.lock().settings.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Parameters for the next connect attempt.
    ///
    /// Always requests the persisted nick so numbered fallbacks never stack.
    pub fn connect_params(&self) -> ConnectParams {
        let irc = &self.config.irc;
        ConnectParams {
            host: irc.server.clone(),
            port: irc.port,
            password: irc.password.clone(),
            nick: self.state.lock().settings.irc_nick.clone(),
            username: self.player.name().to_string(),
            realname: irc.realname.clone(),
            max_nick_attempts: irc.max_nick_attempts,
            connect_timeout: self.config.connect_timeout(),
            registration_timeout: self.config.registration_timeout(),
            verbose: self.config.agent.verbose,
        }
    }

    /// Persist the settings record.
    pub fn save_settings(&self) -> SettingsResult<()> {
        let settings = self.settings();
        self.store.save(&settings)?;
        self.state.lock().settings_new = false;
        Ok(())
    }

    fn persist_settings(&self) {
        if let Err(e) = self.save_settings() {
            warn!(
                "Failed to save IRC settings for '{}': {}",
                self.player.name(),
                e
            );
        }
    }

    fn notify(&self, text: &str) {
        self.player.send_message(text);
    }

    // ============================================================
    // Inbound events
    // ============================================================

    /// React to one transport event.
    pub fn handle_event(&self, event: IrcEvent) {
        match event {
            IrcEvent::Registered { nick } => self.on_registered(nick),
            IrcEvent::Action {
                sender,
                target,
                action,
            } => {
                let ctx = FormatContext::new(sender, colors::from_irc(&action)).with_channel(target);
                self.notify(&self.formats.action.format(&ctx));
            }
            IrcEvent::Disconnected { reason } => self.on_disconnected(&reason),
            IrcEvent::Join { channel, sender } => {
                {
                    let mut state = self.state.lock();
                    if sender.eq_ignore_ascii_case(&state.nick) {
                        state.active_channel = Some(channel.clone());
                    }
                }
                let ctx = FormatContext::new(sender, "").with_channel(channel);
                self.notify(&self.formats.join.format(&ctx));
            }
            IrcEvent::Kick {
                channel,
                kicker,
                recipient,
                reason,
            } => {
                let ctx = FormatContext::new(kicker, colors::from_irc(&reason))
                    .with_channel(channel)
                    .with_target(recipient);
                self.notify(&self.formats.kick.format(&ctx));
            }
            IrcEvent::Message {
                channel,
                sender,
                message,
            } => {
                let ctx = FormatContext::new(sender, colors::from_irc(&message)).with_channel(channel);
                self.notify(&self.formats.message.format(&ctx));
            }
            IrcEvent::NickChange { old_nick, new_nick } => self.on_nick_change(old_nick, new_nick),
            IrcEvent::Part { channel, sender, .. } => {
                let ctx = FormatContext::new(sender, "").with_channel(channel);
                self.notify(&self.formats.part.format(&ctx));
            }
            IrcEvent::PrivateMessage { sender, message } => {
                let ctx = FormatContext::new(sender, colors::from_irc(&message));
                self.notify(&self.formats.private_message.format(&ctx));
            }
            IrcEvent::Quit { sender, reason } => {
                let ctx = FormatContext::new(sender, colors::from_irc(&reason));
                self.notify(&self.formats.quit.format(&ctx));
            }
            IrcEvent::ServerResponse { code, response } => self.on_server_response(code, &response),
            IrcEvent::Topic {
                channel,
                topic,
                changed,
                ..
            } => {
                let ctx = FormatContext::new("", colors::from_irc(&topic)).with_channel(channel);
                let format = if changed {
                    &self.formats.topic_changed
                } else {
                    &self.formats.topic
                };
                self.notify(&format.format(&ctx));
            }
            IrcEvent::UserList { channel, users } => {
                let ctx = FormatContext::new("", users.join(" ")).with_channel(channel);
                self.notify(&self.formats.user_list.format(&ctx));
            }
        }
    }

    fn on_registered(&self, nick: String) {
        let (channels, settings_new) = {
            let mut state = self.state.lock();
            state.nick = nick.clone();

            // Each self-join moves the active channel, so the player's choice goes last
            let mut channels = self.config.irc.channels.clone();
            if let Some(active) = &state.active_channel {
                channels.retain(|c| !c.eq_ignore_ascii_case(active));
                channels.push(active.clone());
            }
            (channels, state.settings_new)
        };

        info!(
            "Player '{}' registered on IRC as '{}'",
            self.player.name(),
            nick
        );

        if settings_new {
            self.persist_settings();
        }
        for channel in channels {
            self.transport
                .send_raw_line(&IrcMessage::join(&channel, None).to_string());
        }
    }

    fn on_disconnected(&self, reason: &str) {
        debug!("IRC session for '{}' ended: {}", self.player.name(), reason);
        self.notify(DISCONNECTED_NOTICE);

        if self.is_shutting_down() {
            debug!("Agent shutting down, not reconnecting");
            return;
        }
        if self.control.reconnect_tx.send(()).is_err() {
            debug!("Connection manager gone, cannot reconnect");
        }
    }

    fn on_nick_change(&self, old_nick: String, new_nick: String) {
        let is_player = old_nick == self.player.display_name();
        let is_self = {
            let mut state = self.state.lock();
            let is_self = old_nick.eq_ignore_ascii_case(&state.nick);
            if is_self {
                state.nick = new_nick.clone();
            }
            if is_self || is_player {
                state.settings.irc_nick = new_nick.clone();
            }
            is_self
        };

        if is_player {
            self.player.set_display_name(&new_nick);
        }
        if is_self || is_player {
            self.persist_settings();
        }

        let ctx = FormatContext::new(old_nick, "").with_target(new_nick);
        self.notify(&self.formats.nick_change.format(&ctx));
    }

    fn on_server_response(&self, code: u16, response: &str) {
        if !is_player_visible_error(code) {
            return;
        }

        match self.numeric_pattern.captures(response) {
            Ok(Some(captures)) => {
                let subject = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
                let message = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
                let ctx = FormatContext::new("", message).with_channel(subject);
                self.notify(&self.formats.error.format(&ctx));
            }
            Ok(None) => debug!("Unrecognised payload for numeric {}: {}", code, response),
            Err(e) => debug!("Failed to match numeric {} payload: {}", code, e),
        }
    }

    // ============================================================
    // Outbound actions
    // ============================================================

    /// Make `channel` the target of channel-unqualified commands.
    pub fn set_active_channel(&self, channel: impl Into<String>) {
        self.state.lock().active_channel = Some(channel.into());
    }

    fn require_active_channel(&self, action: &str) -> Option<String> {
        let channel = self.active_channel();
        if channel.is_none() {
            debug!(
                "No active channel for '{}', dropping {}",
                self.player.name(),
                action
            );
        }
        channel
    }

    /// Send a chat line to the active channel.
    ///
    /// Echoed to the player only while connected, since the server does not
    /// echo our own messages.
    pub fn send_message(&self, text: &str) {
        let Some(channel) = self.require_active_channel("message") else {
            return;
        };
        self.send_text(&channel, text, false);

        if self.transport.is_connected() {
            let ctx = FormatContext::new(self.player.display_name(), text).with_channel(channel);
            self.notify(&self.formats.message.format(&ctx));
        }
    }

    /// Send a `/me` action to the active channel. Always echoed.
    pub fn send_action(&self, text: &str) {
        let Some(channel) = self.require_active_channel("action") else {
            return;
        };
        self.send_text(&channel, text, true);

        let ctx = FormatContext::new(self.player.display_name(), text).with_channel(channel);
        self.notify(&self.formats.action.format(&ctx));
    }

    pub fn send_private_message(&self, nick: &str, text: &str) {
        self.send_text(nick, text, false);
    }

    pub fn join(&self, channel: &str, key: Option<&str>) {
        self.send_line(IrcMessage::join(channel, key));
    }

    pub fn part(&self, channel: &str) {
        self.send_line(IrcMessage::part(channel));
    }

    /// Ask for a new nick; settings follow once the server confirms it.
    pub fn change_nick(&self, nick: &str) {
        self.send_line(IrcMessage::nick(nick));
    }

    pub fn request_topic(&self) {
        if let Some(channel) = self.require_active_channel("topic request") {
            self.send_line(IrcMessage::topic(&channel, None));
        }
    }

    /// Set the active channel's topic, cut to what fits on one line.
    pub fn set_topic(&self, topic: &str) {
        if let Some(channel) = self.require_active_channel("topic change") {
            let topic = colors::to_irc(topic);
            let overhead = "TOPIC  :\r\n".len() + channel.len() + RELAY_PREFIX_RESERVE;
            let topic = truncate_message(&topic, MAX_LINE_LENGTH.saturating_sub(overhead));
            self.send_line(IrcMessage::topic(&channel, Some(topic)));
        }
    }

    pub fn request_names(&self) {
        if let Some(channel) = self.require_active_channel("names request") {
            self.send_line(IrcMessage::names(&channel));
        }
    }

    /// Stop for good: no reconnects after this. Idempotent.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            debug!("Agent for '{}' already shutting down", self.player.name());
            return;
        }
        info!("Shutting down IRC agent for '{}'", self.player.name());

        self.control.shutdown_tx.send_replace(true);
        self.transport.disconnect(Some(QUIT_MESSAGE));
    }

    fn send_line(&self, message: IrcMessage) {
        self.transport.send_raw_line(&message.to_string());
    }

    /// PRIVMSG `text` to `target`, split to fit the line limit.
    fn send_text(&self, target: &str, text: &str, action: bool) {
        let text = colors::to_irc(text);
        if text.is_empty() {
            return;
        }

        let mut overhead = "PRIVMSG  :\r\n".len() + target.len() + RELAY_PREFIX_RESERVE;
        if action {
            overhead += "\x01ACTION \x01".len();
        }
        let room = MAX_LINE_LENGTH.saturating_sub(overhead).max(1);

        for chunk in split_message(&text, room) {
            let body = if action {
                format!("\x01ACTION {}\x01", chunk)
            } else {
                chunk
            };
            self.send_line(IrcMessage::privmsg(target, &body));
        }
    }
}

/// Feed transport events to the agent until shutdown.
async fn run_pump(agent: Arc<IrcAgent>, mut channels: PumpChannels) {
    loop {
        tokio::select! {
            event = channels.events_rx.recv() => match event {
                Some(event) => agent.handle_event(event),
                None => return,
            },
            _ = shutdown_requested(&mut channels.shutdown_rx) => break,
        }
    }

    // Deliver what the closing session still reports
    let drain = async {
        while let Some(event) = channels.events_rx.recv().await {
            let last = matches!(event, IrcEvent::Disconnected { .. });
            agent.handle_event(event);
            if last {
                break;
            }
        }
    };
    if tokio::time::timeout(SHUTDOWN_DRAIN, drain).await.is_err() {
        debug!("No disconnect reported after shutdown");
    }
    debug!("Event pump for '{}' stopped", agent.player.name());
}
