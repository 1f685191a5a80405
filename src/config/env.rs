//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `IRCTRANSPORT_SERVER` - IRC server host
//! - `IRCTRANSPORT_PORT` - IRC server port
//! - `IRCTRANSPORT_PASSWORD` - IRC server password
//! - `IRCTRANSPORT_CHANNELS` - Comma-separated autojoin channels
//! - `IRCTRANSPORT_NICK_PREFIX` - Nick prefix for new agents
//! - `IRCTRANSPORT_NICK_SUFFIX` - Nick suffix for new agents
//! - `IRCTRANSPORT_VERBOSE` - Log raw protocol lines ("true"/"false")

use std::env;

use tracing::warn;

use crate::common::error::ConfigError;
use crate::config::types::Config;

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "IRCTRANSPORT";

/// Apply environment variable overrides to a config.
///
/// Values that cannot be parsed are reported as `InvalidValue`.
pub fn apply_env_overrides(mut config: Config) -> Result<Config, ConfigError> {
    if let Ok(server) = env::var(format!("{}_SERVER", ENV_PREFIX)) {
        config.irc.server = server;
    }
    if let Ok(port) = env::var(format!("{}_PORT", ENV_PREFIX)) {
        config.irc.port = port.parse().map_err(|_| ConfigError::InvalidValue {
            field: format!("{}_PORT", ENV_PREFIX),
            message: format!("'{}' is not a valid port", port),
        })?;
    }
    if let Ok(password) = env::var(format!("{}_PASSWORD", ENV_PREFIX)) {
        config.irc.password = Some(password).filter(|p| !p.is_empty());
    }
    if let Ok(channels) = env::var(format!("{}_CHANNELS", ENV_PREFIX)) {
        config.irc.channels = parse_channel_list(&channels);
    }

    if let Ok(prefix) = env::var(format!("{}_NICK_PREFIX", ENV_PREFIX)) {
        config.agent.nick_prefix = prefix;
    }
    if let Ok(suffix) = env::var(format!("{}_NICK_SUFFIX", ENV_PREFIX)) {
        config.agent.nick_suffix = suffix;
    }
    if let Ok(verbose) = env::var(format!("{}_VERBOSE", ENV_PREFIX)) {
        match verbose.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => config.agent.verbose = true,
            "0" | "false" | "no" | "off" => config.agent.verbose = false,
            other => warn!("Ignoring unrecognised {}_VERBOSE value '{}'", ENV_PREFIX, other),
        }
    }

    Ok(config)
}

/// Split a comma-separated channel list, dropping empty entries.
fn parse_channel_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Get the config file path from environment or use default.
///
/// Checks `IRCTRANSPORT_CONFIG`, otherwise returns "irctransport.conf".
pub fn get_config_path() -> String {
    env::var(format!("{}_CONFIG", ENV_PREFIX)).unwrap_or_else(|_| "irctransport.conf".to_string())
}

/// Get the player name the console host runs as.
///
/// Checks `IRCTRANSPORT_PLAYER`, otherwise returns "Player".
pub fn get_player_name() -> String {
    env::var(format!("{}_PLAYER", ENV_PREFIX))
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "Player".to_string())
}
