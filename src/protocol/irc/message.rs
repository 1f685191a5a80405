//! IRC protocol lines.
//!
//! Line format: `[@tags ][:prefix ]COMMAND[ params...][ :trailing]`.
//! Tags are kept raw; this client never acts on them.

use std::fmt;

/// A parsed IRC line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub tags: Option<String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    pub fn new(command: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            tags: None,
            prefix: None,
            command: command.into(),
            params,
        }
    }

    /// Parse one line without its terminator.
    ///
    /// Returns `None` for blank lines or lines without a command.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']).trim_start_matches(' ');

        let tags = if let Some(stripped) = rest.strip_prefix('@') {
            let (tags, tail) = stripped.split_once(' ')?;
            rest = tail.trim_start_matches(' ');
            Some(tags.to_string())
        } else {
            None
        };

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, tail) = stripped.split_once(' ')?;
            rest = tail.trim_start_matches(' ');
            Some(prefix.to_string())
        } else {
            None
        };

        let (command, mut rest) = match rest.split_once(' ') {
            Some((command, tail)) => (command, tail),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, tail)) => {
                    params.push(param.to_string());
                    rest = tail;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Some(Self {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Nick part of the prefix (`nick!user@host`).
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .map(|prefix| prefix.split(['!', '@']).next().unwrap_or(prefix))
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Last parameter, usually the trailing text.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// Three-digit reply code, if this is a numeric.
    pub fn numeric(&self) -> Option<u16> {
        if self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit()) {
            self.command.parse().ok()
        } else {
            None
        }
    }

    pub fn privmsg(target: &str, text: &str) -> Self {
        Self::new("PRIVMSG", vec![target.to_string(), text.to_string()])
    }

    pub fn notice(target: &str, text: &str) -> Self {
        Self::new("NOTICE", vec![target.to_string(), text.to_string()])
    }

    pub fn join(channel: &str, key: Option<&str>) -> Self {
        let mut params = vec![channel.to_string()];
        if let Some(key) = key {
            params.push(key.to_string());
        }
        Self::new("JOIN", params)
    }

    pub fn part(channel: &str) -> Self {
        Self::new("PART", vec![channel.to_string()])
    }

    pub fn nick(nick: &str) -> Self {
        Self::new("NICK", vec![nick.to_string()])
    }

    pub fn user(username: &str, realname: &str) -> Self {
        Self::new(
            "USER",
            vec![
                username.to_string(),
                "0".to_string(),
                "*".to_string(),
                realname.to_string(),
            ],
        )
    }

    pub fn pass(password: &str) -> Self {
        Self::new("PASS", vec![password.to_string()])
    }

    pub fn pong(token: &str) -> Self {
        Self::new("PONG", vec![token.to_string()])
    }

    pub fn quit(reason: Option<&str>) -> Self {
        Self::new("QUIT", reason.map(str::to_string).into_iter().collect())
    }

    /// `TOPIC channel` queries, `TOPIC channel :text` sets.
    pub fn topic(channel: &str, topic: Option<&str>) -> Self {
        let mut params = vec![channel.to_string()];
        if let Some(topic) = topic {
            params.push(topic.to_string());
        }
        Self::new("TOPIC", params)
    }

    pub fn names(channel: &str) -> Self {
        Self::new("NAMES", vec![channel.to_string()])
    }
}

impl fmt::Display for IrcMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tags) = &self.tags {
            write!(f, "@{} ", tags)?;
        }
        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        f.write_str(&self.command)?;

        let count = self.params.len();
        for (i, param) in self.params.iter().enumerate() {
            let last = i + 1 == count;
            let needs_colon = param.is_empty() || param.contains(' ') || param.starts_with(':');
            if last && (count > 1 || needs_colon) {
                write!(f, " :{}", param)?;
            } else {
                write!(f, " {}", param)?;
            }
        }
        Ok(())
    }
}
