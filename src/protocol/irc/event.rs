//! Events the transport reports to the agent.

/// A protocol event already reduced to what the agent reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcEvent {
    /// Registration completed under the server-confirmed nick.
    Registered { nick: String },
    /// CTCP ACTION (`/me`) to a channel or to us.
    Action {
        sender: String,
        target: String,
        action: String,
    },
    /// The session ended, requested or not.
    Disconnected { reason: String },
    Join { channel: String, sender: String },
    Kick {
        channel: String,
        kicker: String,
        recipient: String,
        reason: String,
    },
    /// Channel message.
    Message {
        channel: String,
        sender: String,
        message: String,
    },
    NickChange { old_nick: String, new_nick: String },
    Part {
        channel: String,
        sender: String,
        reason: Option<String>,
    },
    PrivateMessage { sender: String, message: String },
    Quit { sender: String, reason: String },
    /// Any numeric reply. `response` is the reply with the command and
    /// source stripped, e.g. `me #chan :Cannot join channel (+i)`.
    ServerResponse { code: u16, response: String },
    Topic {
        channel: String,
        topic: String,
        set_by: Option<String>,
        changed: bool,
    },
    /// Complete NAMES listing for a channel.
    UserList { channel: String, users: Vec<String> },
}
