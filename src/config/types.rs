//! Configuration type definitions.

use std::time::Duration;

use serde::Deserialize;

use crate::common::reconnect::ReconnectConfig;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub irc: IrcConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    pub settings: Option<SettingsConfig>,
    pub formats: Option<FormatsConfig>,
}

/// IRC server connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IrcConfig {
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub password: Option<String>,
    #[serde(default = "default_realname")]
    pub realname: String,
    /// Channels every agent joins once registered.
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_registration_timeout")]
    pub registration_timeout_secs: u64,
    /// How many numbered variants of a taken nick to try before giving up.
    #[serde(default = "default_max_nick_attempts")]
    pub max_nick_attempts: u32,
}

/// Per-agent identity settings shared by every player.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub nick_prefix: String,
    #[serde(default)]
    pub nick_suffix: String,
    /// Log raw protocol lines at info level.
    #[serde(default)]
    pub verbose: bool,
}

/// Settings store location.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsConfig {
    pub path: String,
}

/// Optional overrides for player-facing notification formats.
///
/// Placeholders: %time, %user, %message, %target, %channel
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormatsConfig {
    pub action: Option<String>,
    pub join: Option<String>,
    pub kick: Option<String>,
    pub message: Option<String>,
    pub nick_change: Option<String>,
    pub part: Option<String>,
    pub private_message: Option<String>,
    pub quit: Option<String>,
    pub error: Option<String>,
    pub topic: Option<String>,
    pub topic_changed: Option<String>,
    pub user_list: Option<String>,
}

fn default_port() -> u16 {
    6667
}

fn default_realname() -> String {
    "IRCTransport".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_registration_timeout() -> u64 {
    60
}

fn default_max_nick_attempts() -> u32 {
    9
}

/// Default settings file when `settings.path` is not configured.
pub const DEFAULT_SETTINGS_PATH: &str = "irctransport-settings.json";

impl Default for Config {
    fn default() -> Self {
        Self {
            irc: IrcConfig {
                server: "localhost".to_string(),
                port: default_port(),
                password: None,
                realname: default_realname(),
                channels: Vec::new(),
                connect_timeout_secs: default_connect_timeout(),
                registration_timeout_secs: default_registration_timeout(),
                max_nick_attempts: default_max_nick_attempts(),
            },
            agent: AgentConfig::default(),
            reconnect: ReconnectConfig::default(),
            settings: None,
            formats: None,
        }
    }
}

impl Config {
    /// Nickname given to a player that has no persisted settings.
    pub fn default_nick(&self, player_name: &str) -> String {
        format!(
            "{}{}{}",
            self.agent.nick_prefix, player_name, self.agent.nick_suffix
        )
    }

    pub fn settings_path(&self) -> &str {
        self.settings
            .as_ref()
            .map(|s| s.path.as_str())
            .unwrap_or(DEFAULT_SETTINGS_PATH)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.irc.connect_timeout_secs)
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.irc.registration_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_nick_uses_prefix_and_suffix() {
        let mut config = Config::default();
        config.agent.nick_prefix = "mc_".to_string();
        config.agent.nick_suffix = "|game".to_string();

        assert_eq!(config.default_nick("Steve"), "mc_Steve|game");
    }

    #[test]
    fn test_default_nick_without_affixes() {
        let config = Config::default();
        assert_eq!(config.default_nick("Alex"), "Alex");
    }

    #[test]
    fn test_settings_path_fallback() {
        let mut config = Config::default();
        assert_eq!(config.settings_path(), DEFAULT_SETTINGS_PATH);

        config.settings = Some(SettingsConfig {
            path: "/var/lib/irc/settings.json".to_string(),
        });
        assert_eq!(config.settings_path(), "/var/lib/irc/settings.json");
    }
}
