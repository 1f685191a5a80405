//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use crate::common::error::ConfigError;
use crate::config::types::Config;

/// Characters that may start an IRC channel name.
const CHANNEL_PREFIXES: &[char] = &['#', '&', '+', '!'];

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    // Validate IRC server config
    if config.irc.server.trim().is_empty() {
        errors.push("irc.server is required".to_string());
    }
    if config.irc.port == 0 {
        errors.push("irc.port must be non-zero".to_string());
    }
    if config.irc.connect_timeout_secs == 0 {
        errors.push("irc.connect_timeout_secs must be non-zero".to_string());
    }
    if config.irc.registration_timeout_secs == 0 {
        errors.push("irc.registration_timeout_secs must be non-zero".to_string());
    }

    for (i, channel) in config.irc.channels.iter().enumerate() {
        if !channel.starts_with(CHANNEL_PREFIXES) {
            errors.push(format!(
                "irc.channels[{}] '{}' must start with one of # & + !",
                i, channel
            ));
        }
        if channel.contains([' ', ',', '\x07']) {
            errors.push(format!(
                "irc.channels[{}] '{}' contains an invalid character",
                i, channel
            ));
        }
    }

    // Validate nick affixes
    for (field, value) in [
        ("agent.nick_prefix", &config.agent.nick_prefix),
        ("agent.nick_suffix", &config.agent.nick_suffix),
    ] {
        if value.contains(char::is_whitespace) {
            errors.push(format!("{} must not contain whitespace", field));
        }
    }
    if config.agent.nick_prefix.starts_with(CHANNEL_PREFIXES)
        || config.agent.nick_prefix.starts_with(|c: char| c.is_ascii_digit())
    {
        errors.push(format!(
            "agent.nick_prefix '{}' would produce an invalid nickname",
            config.agent.nick_prefix
        ));
    }

    // Validate reconnect policy
    if config.reconnect.min_delay_secs > config.reconnect.max_delay_secs {
        errors.push(format!(
            "reconnect.min_delay_secs ({}) exceeds reconnect.max_delay_secs ({})",
            config.reconnect.min_delay_secs, config.reconnect.max_delay_secs
        ));
    }
    if config.reconnect.factor < 1.0 {
        errors.push(format!(
            "reconnect.factor must be at least 1.0 (got {})",
            config.reconnect.factor
        ));
    }

    if config.settings_path().trim().is_empty() {
        errors.push("settings.path must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}
