//! IRC client session state machine.
//!
//! Pure protocol logic with no I/O: the transport feeds every inbound line to
//! `IrcSession::handle` and writes back the replies it returns. This keeps
//! registration, nick negotiation and CTCP handling testable without sockets.

use std::collections::HashMap;

use chrono::Local;
use tracing::debug;

use crate::common::error::{ConnectionError, ConnectionResult};
use crate::protocol::irc::event::IrcEvent;
use crate::protocol::irc::message::IrcMessage;
use crate::protocol::irc::numerics::*;
use crate::protocol::irc::transport::ConnectParams;

/// CTCP VERSION reply.
pub const CTCP_VERSION: &str = concat!("irctransport ", env!("CARGO_PKG_VERSION"));

const CTCP_DELIM: char = '\x01';

/// Characters that may start a channel name.
const CHANNEL_PREFIXES: &[char] = &['#', '&', '+', '!'];

pub fn is_channel_name(target: &str) -> bool {
    target.starts_with(CHANNEL_PREFIXES)
}

/// What one inbound line produced.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SessionStep {
    /// Lines to send back to the server.
    pub replies: Vec<IrcMessage>,
    /// Events for the agent.
    pub events: Vec<IrcEvent>,
}

impl SessionStep {
    fn reply(&mut self, message: IrcMessage) {
        self.replies.push(message);
    }

    fn event(&mut self, event: IrcEvent) {
        self.events.push(event);
    }
}

/// Per-connection protocol state.
#[derive(Debug)]
pub struct IrcSession {
    base_nick: String,
    nick: String,
    username: String,
    realname: String,
    password: Option<String>,
    max_nick_attempts: u32,
    nick_attempts: u32,
    registered: bool,
    /// NAMES replies collected until end-of-names, keyed by lowercased channel.
    pending_names: HashMap<String, (String, Vec<String>)>,
    /// Reason from the last ERROR line, reported when the link drops.
    last_error: Option<String>,
}

impl IrcSession {
    pub fn new(params: &ConnectParams) -> Self {
        Self {
            base_nick: params.nick.clone(),
            nick: params.nick.clone(),
            username: params.username.clone(),
            realname: params.realname.clone(),
            password: params.password.clone(),
            max_nick_attempts: params.max_nick_attempts,
            nick_attempts: 0,
            registered: false,
            pending_names: HashMap::new(),
            last_error: None,
        }
    }

    /// Current nick (server-confirmed once registered).
    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Lines that open the session.
    pub fn registration_lines(&self) -> Vec<IrcMessage> {
        let mut lines = Vec::with_capacity(3);
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            lines.push(IrcMessage::pass(password));
        }
        lines.push(IrcMessage::nick(&self.nick));
        lines.push(IrcMessage::user(&self.username, &self.realname));
        lines
    }

    /// Process one inbound line.
    ///
    /// Errors are fatal for the connection and only occur before registration.
    pub fn handle(&mut self, msg: &IrcMessage) -> ConnectionResult<SessionStep> {
        let mut step = SessionStep::default();

        if let Some(code) = msg.numeric() {
            self.handle_numeric(code, msg, &mut step)?;
            step.event(IrcEvent::ServerResponse {
                code,
                response: numeric_response(msg),
            });
            return Ok(step);
        }

        let sender = msg.source_nick().unwrap_or_default().to_string();
        match msg.command.as_str() {
            "PING" => {
                step.reply(IrcMessage::pong(msg.param(0).unwrap_or_default()));
            }
            "ERROR" => {
                let reason = msg.trailing().unwrap_or("Connection closed").to_string();
                if !self.registered {
                    return Err(ConnectionError::RegistrationFailed { reason });
                }
                self.last_error = Some(reason);
            }
            "JOIN" => {
                if let Some(channel) = msg.param(0) {
                    step.event(IrcEvent::Join {
                        channel: channel.to_string(),
                        sender,
                    });
                }
            }
            "PART" => {
                if let Some(channel) = msg.param(0) {
                    step.event(IrcEvent::Part {
                        channel: channel.to_string(),
                        sender,
                        reason: msg.param(1).map(str::to_string),
                    });
                }
            }
            "KICK" => {
                if let (Some(channel), Some(recipient)) = (msg.param(0), msg.param(1)) {
                    step.event(IrcEvent::Kick {
                        channel: channel.to_string(),
                        kicker: sender,
                        recipient: recipient.to_string(),
                        reason: msg.param(2).unwrap_or_default().to_string(),
                    });
                }
            }
            "QUIT" => {
                step.event(IrcEvent::Quit {
                    sender,
                    reason: msg.param(0).unwrap_or_default().to_string(),
                });
            }
            "NICK" => {
                if let Some(new_nick) = msg.param(0) {
                    if sender.eq_ignore_ascii_case(&self.nick) {
                        self.nick = new_nick.to_string();
                    }
                    step.event(IrcEvent::NickChange {
                        old_nick: sender,
                        new_nick: new_nick.to_string(),
                    });
                }
            }
            "TOPIC" => {
                if let Some(channel) = msg.param(0) {
                    step.event(IrcEvent::Topic {
                        channel: channel.to_string(),
                        topic: msg.param(1).unwrap_or_default().to_string(),
                        set_by: Some(sender),
                        changed: true,
                    });
                }
            }
            "PRIVMSG" => {
                if let (Some(target), Some(text)) = (msg.param(0), msg.param(1)) {
                    self.handle_privmsg(sender, target, text, &mut step);
                }
            }
            other => {
                debug!("Ignoring {} from {}", other, sender);
            }
        }

        Ok(step)
    }

    fn handle_numeric(
        &mut self,
        code: u16,
        msg: &IrcMessage,
        step: &mut SessionStep,
    ) -> ConnectionResult<()> {
        match code {
            RPL_WELCOME => {
                if let Some(nick) = msg.param(0) {
                    self.nick = nick.to_string();
                }
                self.registered = true;
                step.event(IrcEvent::Registered {
                    nick: self.nick.clone(),
                });
            }
            ERR_NICKNAMEINUSE if !self.registered => {
                if self.nick_attempts >= self.max_nick_attempts {
                    return Err(ConnectionError::NickUnavailable {
                        nick: self.nick.clone(),
                        attempts: self.nick_attempts,
                    });
                }
                self.nick_attempts += 1;
                self.nick = format!("{}{}", self.base_nick, self.nick_attempts);
                debug!("Nick in use, trying '{}'", self.nick);
                step.reply(IrcMessage::nick(&self.nick));
            }
            ERR_ERRONEUSNICKNAME if !self.registered => {
                return Err(ConnectionError::RegistrationFailed {
                    reason: format!("erroneous nickname '{}'", self.nick),
                });
            }
            RPL_TOPIC => {
                if let (Some(channel), Some(topic)) = (msg.param(1), msg.param(2)) {
                    step.event(IrcEvent::Topic {
                        channel: channel.to_string(),
                        topic: topic.to_string(),
                        set_by: None,
                        changed: false,
                    });
                }
            }
            RPL_NAMREPLY => {
                // me = #channel :nick1 @nick2 +nick3
                let count = msg.params.len();
                if count >= 3 {
                    let channel = &msg.params[count - 2];
                    let entry = self
                        .pending_names
                        .entry(channel.to_ascii_lowercase())
                        .or_insert_with(|| (channel.clone(), Vec::new()));
                    entry
                        .1
                        .extend(msg.params[count - 1].split_whitespace().map(str::to_string));
                }
            }
            RPL_ENDOFNAMES => {
                if let Some(channel) = msg.param(1) {
                    let (channel, users) = self
                        .pending_names
                        .remove(&channel.to_ascii_lowercase())
                        .unwrap_or_else(|| (channel.to_string(), Vec::new()));
                    step.event(IrcEvent::UserList { channel, users });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_privmsg(&mut self, sender: String, target: &str, text: &str, step: &mut SessionStep) {
        let Some(ctcp) = text.strip_prefix(CTCP_DELIM) else {
            if is_channel_name(target) {
                step.event(IrcEvent::Message {
                    channel: target.to_string(),
                    sender,
                    message: text.to_string(),
                });
            } else {
                step.event(IrcEvent::PrivateMessage {
                    sender,
                    message: text.to_string(),
                });
            }
            return;
        };

        let ctcp = ctcp.strip_suffix(CTCP_DELIM).unwrap_or(ctcp);
        let (command, args) = ctcp.split_once(' ').unwrap_or((ctcp, ""));

        match command.to_ascii_uppercase().as_str() {
            "ACTION" => step.event(IrcEvent::Action {
                sender,
                target: target.to_string(),
                action: args.to_string(),
            }),
            "VERSION" => step.reply(ctcp_reply(&sender, "VERSION", CTCP_VERSION)),
            "PING" => step.reply(ctcp_reply(&sender, "PING", args)),
            "TIME" => step.reply(ctcp_reply(&sender, "TIME", &Local::now().to_rfc2822())),
            other => debug!("Ignoring CTCP {} from {}", other, sender),
        }
    }
}

fn ctcp_reply(target: &str, command: &str, args: &str) -> IrcMessage {
    let body = if args.is_empty() {
        format!("{d}{}{d}", command, d = CTCP_DELIM)
    } else {
        format!("{d}{} {}{d}", command, args, d = CTCP_DELIM)
    };
    IrcMessage::notice(target, &body)
}

/// Numeric reply text without source and code: middle params, then the trailing one.
fn numeric_response(msg: &IrcMessage) -> String {
    match msg.params.split_last() {
        Some((trailing, [])) => format!(":{}", trailing),
        Some((trailing, middle)) => format!("{} :{}", middle.join(" "), trailing),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConnectParams {
        ConnectParams {
            nick: "mc_Steve".to_string(),
            username: "Steve".to_string(),
            password: Some("secret".to_string()),
            max_nick_attempts: 2,
            ..ConnectParams::default()
        }
    }

    fn feed(session: &mut IrcSession, line: &str) -> SessionStep {
        session.handle(&IrcMessage::parse(line).unwrap()).unwrap()
    }

    #[test]
    fn test_registration_lines() {
        let session = IrcSession::new(&params());
        let lines: Vec<String> = session
            .registration_lines()
            .iter()
            .map(ToString::to_string)
            .collect();

        assert_eq!(lines, vec!["PASS secret", "NICK mc_Steve", "USER Steve 0 * :IRCTransport"]);
    }

    #[test]
    fn test_welcome_confirms_nick() {
        let mut session = IrcSession::new(&params());
        let step = feed(&mut session, ":irc.test 001 mc_Steve1 :Welcome to the network");

        assert!(session.is_registered());
        assert_eq!(session.nick(), "mc_Steve1");
        assert_eq!(
            step.events[0],
            IrcEvent::Registered {
                nick: "mc_Steve1".to_string()
            }
        );
        assert_eq!(
            step.events[1],
            IrcEvent::ServerResponse {
                code: 1,
                response: "mc_Steve1 :Welcome to the network".to_string()
            }
        );
    }

    #[test]
    fn test_nick_in_use_retries_then_gives_up() {
        let mut session = IrcSession::new(&params());

        let step = feed(&mut session, ":irc.test 433 * mc_Steve :Nickname is already in use.");
        assert_eq!(step.replies, vec![IrcMessage::nick("mc_Steve1")]);
        assert!(matches!(
            step.events[0],
            IrcEvent::ServerResponse { code: 433, .. }
        ));

        let step = feed(&mut session, ":irc.test 433 * mc_Steve1 :Nickname is already in use.");
        assert_eq!(step.replies, vec![IrcMessage::nick("mc_Steve2")]);

        let err = session
            .handle(&IrcMessage::parse(":irc.test 433 * mc_Steve2 :in use").unwrap())
            .unwrap_err();
        assert!(matches!(err, ConnectionError::NickUnavailable { attempts: 2, .. }));
    }

    #[test]
    fn test_nick_in_use_after_registration_is_only_reported() {
        let mut session = IrcSession::new(&params());
        feed(&mut session, ":irc.test 001 mc_Steve :Welcome");

        let step = feed(&mut session, ":irc.test 433 mc_Steve taken :Nickname is already in use.");
        assert!(step.replies.is_empty());
        assert_eq!(session.nick(), "mc_Steve");
    }

    #[test]
    fn test_error_before_registration_fails() {
        let mut session = IrcSession::new(&params());
        let err = session
            .handle(&IrcMessage::parse("ERROR :Closing Link: banned").unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("banned"));
    }

    #[test]
    fn test_ping_pong() {
        let mut session = IrcSession::new(&params());
        let step = feed(&mut session, "PING :irc.test");
        assert_eq!(step.replies, vec![IrcMessage::pong("irc.test")]);
        assert!(step.events.is_empty());
    }

    #[test]
    fn test_channel_and_private_messages() {
        let mut session = IrcSession::new(&params());

        let step = feed(&mut session, ":alex!a@h PRIVMSG #mc :hi all");
        assert_eq!(
            step.events,
            vec![IrcEvent::Message {
                channel: "#mc".to_string(),
                sender: "alex".to_string(),
                message: "hi all".to_string()
            }]
        );

        let step = feed(&mut session, ":alex!a@h PRIVMSG mc_Steve :psst");
        assert_eq!(
            step.events,
            vec![IrcEvent::PrivateMessage {
                sender: "alex".to_string(),
                message: "psst".to_string()
            }]
        );
    }

    #[test]
    fn test_ctcp_action_and_version() {
        let mut session = IrcSession::new(&params());

        let step = feed(&mut session, ":alex!a@h PRIVMSG #mc :\x01ACTION waves\x01");
        assert_eq!(
            step.events,
            vec![IrcEvent::Action {
                sender: "alex".to_string(),
                target: "#mc".to_string(),
                action: "waves".to_string()
            }]
        );

        let step = feed(&mut session, ":alex!a@h PRIVMSG mc_Steve :\x01VERSION\x01");
        assert!(step.events.is_empty());
        assert_eq!(
            step.replies[0].to_string(),
            format!("NOTICE alex :\x01VERSION {}\x01", CTCP_VERSION)
        );

        let step = feed(&mut session, ":alex!a@h PRIVMSG mc_Steve :\x01PING 12345\x01");
        assert_eq!(step.replies[0].params[1], "\x01PING 12345\x01");
    }

    #[test]
    fn test_names_accumulate_until_end() {
        let mut session = IrcSession::new(&params());

        let step = feed(&mut session, ":irc.test 353 mc_Steve = #MC :@op alex");
        assert!(!step
            .events
            .iter()
            .any(|e| matches!(e, IrcEvent::UserList { .. })));
        feed(&mut session, ":irc.test 353 mc_Steve = #MC :+voice mc_Steve");

        let step = feed(&mut session, ":irc.test 366 mc_Steve #mc :End of /NAMES list.");
        assert_eq!(
            step.events[0],
            IrcEvent::UserList {
                channel: "#MC".to_string(),
                users: vec!["@op", "alex", "+voice", "mc_Steve"]
                    .into_iter()
                    .map(String::from)
                    .collect()
            }
        );

        // A second listing starts fresh
        let step = feed(&mut session, ":irc.test 366 mc_Steve #mc :End of /NAMES list.");
        assert!(matches!(&step.events[0], IrcEvent::UserList { users, .. } if users.is_empty()));
    }

    #[test]
    fn test_topic_reply_and_change() {
        let mut session = IrcSession::new(&params());

        let step = feed(&mut session, ":irc.test 332 mc_Steve #mc :Welcome builders");
        assert_eq!(
            step.events[0],
            IrcEvent::Topic {
                channel: "#mc".to_string(),
                topic: "Welcome builders".to_string(),
                set_by: None,
                changed: false
            }
        );

        let step = feed(&mut session, ":op!o@h TOPIC #mc :New season");
        assert_eq!(
            step.events[0],
            IrcEvent::Topic {
                channel: "#mc".to_string(),
                topic: "New season".to_string(),
                set_by: Some("op".to_string()),
                changed: true
            }
        );
    }

    #[test]
    fn test_own_nick_change_is_tracked() {
        let mut session = IrcSession::new(&params());
        feed(&mut session, ":irc.test 001 mc_Steve :Welcome");

        let step = feed(&mut session, ":MC_STEVE!s@h NICK :steve");
        assert_eq!(session.nick(), "steve");
        assert_eq!(
            step.events[0],
            IrcEvent::NickChange {
                old_nick: "MC_STEVE".to_string(),
                new_nick: "steve".to_string()
            }
        );

        feed(&mut session, ":alex!a@h NICK :alex2");
        assert_eq!(session.nick(), "steve");
    }

    #[test]
    fn test_membership_events() {
        let mut session = IrcSession::new(&params());

        let step = feed(&mut session, ":op!o@h KICK #mc alex :too loud");
        assert_eq!(
            step.events[0],
            IrcEvent::Kick {
                channel: "#mc".to_string(),
                kicker: "op".to_string(),
                recipient: "alex".to_string(),
                reason: "too loud".to_string()
            }
        );

        let step = feed(&mut session, ":alex!a@h QUIT :Ping timeout");
        assert_eq!(
            step.events[0],
            IrcEvent::Quit {
                sender: "alex".to_string(),
                reason: "Ping timeout".to_string()
            }
        );

        let step = feed(&mut session, ":alex!a@h PART #mc");
        assert!(matches!(&step.events[0], IrcEvent::Part { reason: None, .. }));
    }

    #[test]
    fn test_error_after_registration_is_remembered() {
        let mut session = IrcSession::new(&params());
        feed(&mut session, ":irc.test 001 mc_Steve :Welcome");

        let step = feed(&mut session, "ERROR :Closing Link: timeout");
        assert!(step.events.is_empty());
        assert_eq!(session.last_error(), Some("Closing Link: timeout"));
    }

    #[test]
    fn test_numeric_response_text() {
        let msg = IrcMessage::parse(":irc.test 473 mc_Steve #vip :Cannot join channel (+i)").unwrap();
        assert_eq!(numeric_response(&msg), "mc_Steve #vip :Cannot join channel (+i)");

        let msg = IrcMessage::parse(":irc.test 999 :only").unwrap();
        assert_eq!(numeric_response(&msg), ":only");
    }
}
