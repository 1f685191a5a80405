//! Message formatting for display.
//!
//! Handles placeholder substitution in notification format strings.
//! Supports placeholders: %time, %user, %message, %target, %channel

use chrono::Local;

use crate::config::FormatsConfig;
use crate::game::colors::color_safe_boundary;

/// Notice sent to the player when the IRC session drops.
pub const DISCONNECTED_NOTICE: &str = "ChatService Disconnected.";

/// Notice sent to the player when reconnect attempts are exhausted.
pub const UNAVAILABLE_NOTICE: &str = "§eChatService unavailable, giving up on reconnecting.";

pub const DEFAULT_ACTION_FORMAT: &str = "[%channel] * %user %message";
pub const DEFAULT_JOIN_FORMAT: &str = "§e[%channel] %user has joined.";
pub const DEFAULT_KICK_FORMAT: &str = "§e[%channel] %target kicked by %user: %message";
pub const DEFAULT_MESSAGE_FORMAT: &str = "[%channel] %user: %message";
pub const DEFAULT_NICK_CHANGE_FORMAT: &str = "%user is now known as %target";
pub const DEFAULT_PART_FORMAT: &str = "§e[%channel] %user has parted.";
pub const DEFAULT_PRIVATE_MESSAGE_FORMAT: &str = "%user: %message";
pub const DEFAULT_QUIT_FORMAT: &str = "§e%user has quit: %message";
pub const DEFAULT_ERROR_FORMAT: &str = "§e[%channel] %message";
pub const DEFAULT_TOPIC_FORMAT: &str = "§e[%channel] Topic: %message";
pub const DEFAULT_TOPIC_CHANGED_FORMAT: &str = "§e[%channel] Topic changed: %message";
pub const DEFAULT_USER_LIST_FORMAT: &str = "%channel members: %message";

const PLACEHOLDERS: [&str; 5] = ["%time", "%user", "%message", "%target", "%channel"];

/// Message formatter that substitutes placeholders in format strings.
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    /// Format string for this formatter.
    format: String,
}

impl MessageFormatter {
    /// Create a new formatter with the given format string.
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }

    /// Format a message with the given context.
    ///
    /// Substitution is a single pass over the format string, so placeholder
    /// text inside user-supplied values is left alone.
    /// - `%time` - Current time (HH:MM:SS)
    /// - `%user` - Sender nick
    /// - `%message` - The message content
    /// - `%target` - Kicked user or new nick
    /// - `%channel` - Channel name
    pub fn format(&self, ctx: &FormatContext) -> String {
        let mut out = String::with_capacity(self.format.len() + ctx.message.len() + 16);
        let mut rest = self.format.as_str();

        while let Some(idx) = rest.find('%') {
            out.push_str(&rest[..idx]);
            rest = &rest[idx..];

            match PLACEHOLDERS.iter().find(|p| rest.starts_with(*p)) {
                Some(placeholder) => {
                    match *placeholder {
                        "%time" => out.push_str(&get_time()),
                        "%user" => out.push_str(&ctx.user),
                        "%message" => out.push_str(&ctx.message),
                        "%target" => out.push_str(&ctx.target),
                        _ => out.push_str(&ctx.channel),
                    }
                    rest = &rest[placeholder.len()..];
                }
                None => {
                    out.push('%');
                    rest = &rest[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Get the format string.
    pub fn format_string(&self) -> &str {
        &self.format
    }
}

/// Context for message formatting.
#[derive(Debug, Clone, Default)]
pub struct FormatContext {
    /// The sender's nick.
    pub user: String,
    /// The message content.
    pub message: String,
    /// Kicked nick or new nick.
    pub target: String,
    /// Channel name.
    pub channel: String,
}

impl FormatContext {
    /// Create a new format context.
    pub fn new(user: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    /// Set the target.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Set the channel.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }
}

/// One formatter per notification kind.
#[derive(Debug, Clone)]
pub struct NotificationFormats {
    pub action: MessageFormatter,
    pub join: MessageFormatter,
    pub kick: MessageFormatter,
    pub message: MessageFormatter,
    pub nick_change: MessageFormatter,
    pub part: MessageFormatter,
    pub private_message: MessageFormatter,
    pub quit: MessageFormatter,
    pub error: MessageFormatter,
    pub topic: MessageFormatter,
    pub topic_changed: MessageFormatter,
    pub user_list: MessageFormatter,
}

impl Default for NotificationFormats {
    fn default() -> Self {
        Self::from_config(None)
    }
}

impl NotificationFormats {
    /// Build formatters from config, falling back to the defaults for unset entries.
    pub fn from_config(formats: Option<&FormatsConfig>) -> Self {
        let pick = |value: Option<&String>, default: &str| {
            MessageFormatter::new(value.map(String::as_str).unwrap_or(default))
        };
        let f = formats.cloned().unwrap_or_default();

        Self {
            action: pick(f.action.as_ref(), DEFAULT_ACTION_FORMAT),
            join: pick(f.join.as_ref(), DEFAULT_JOIN_FORMAT),
            kick: pick(f.kick.as_ref(), DEFAULT_KICK_FORMAT),
            message: pick(f.message.as_ref(), DEFAULT_MESSAGE_FORMAT),
            nick_change: pick(f.nick_change.as_ref(), DEFAULT_NICK_CHANGE_FORMAT),
            part: pick(f.part.as_ref(), DEFAULT_PART_FORMAT),
            private_message: pick(f.private_message.as_ref(), DEFAULT_PRIVATE_MESSAGE_FORMAT),
            quit: pick(f.quit.as_ref(), DEFAULT_QUIT_FORMAT),
            error: pick(f.error.as_ref(), DEFAULT_ERROR_FORMAT),
            topic: pick(f.topic.as_ref(), DEFAULT_TOPIC_FORMAT),
            topic_changed: pick(f.topic_changed.as_ref(), DEFAULT_TOPIC_CHANGED_FORMAT),
            user_list: pick(f.user_list.as_ref(), DEFAULT_USER_LIST_FORMAT),
        }
    }
}

/// Get the current time as HH:MM:SS string.
fn get_time() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Find the last UTF-8 char boundary at or before `byte_index` in `s`.
///
/// Returns a byte offset that is safe to use for slicing `s`.
fn floor_char_boundary(s: &str, byte_index: usize) -> usize {
    if byte_index >= s.len() {
        return s.len();
    }
    let mut i = byte_index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Split a message into chunks that fit within the max length (in bytes).
///
/// Tries to split on word boundaries when possible. Never splits in the
/// middle of a multi-byte UTF-8 character or an IRC color sequence.
pub fn split_message(message: &str, max_len: usize) -> Vec<String> {
    if message.len() <= max_len {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = message;

    while !remaining.is_empty() {
        // Skip leading spaces left over from previous word-boundary splits
        remaining = remaining.trim_start();
        if remaining.is_empty() {
            break;
        }

        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let split_at = floor_char_boundary(remaining, max_len);
        let split_at = match color_safe_boundary(remaining, split_at) {
            0 => split_at,
            at => at,
        };

        // Force at least one character when max_len is below its width
        if split_at == 0 {
            let first_char_end = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
            chunks.push(remaining[..first_char_end].to_string());
            remaining = &remaining[first_char_end..];
            continue;
        }

        let chunk = &remaining[..split_at];

        match chunk.rfind(' ') {
            Some(space_idx) if space_idx > 0 => {
                chunks.push(remaining[..space_idx].to_string());
                remaining = &remaining[space_idx + 1..];
            }
            _ => {
                chunks.push(chunk.to_string());
                remaining = &remaining[split_at..];
            }
        }
    }

    chunks
}

/// Cut a message to at most `max_len` bytes on a safe boundary.
pub fn truncate_message(message: &str, max_len: usize) -> &str {
    if message.len() <= max_len {
        return message;
    }
    let end = floor_char_boundary(message, max_len);
    &message[..color_safe_boundary(message, end)]
}
