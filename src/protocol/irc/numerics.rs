//! Numeric reply codes used by the client.

pub const RPL_WELCOME: u16 = 1;
pub const RPL_TOPIC: u16 = 332;
pub const RPL_TOPICWHOTIME: u16 = 333;
pub const RPL_NAMREPLY: u16 = 353;
pub const RPL_ENDOFNAMES: u16 = 366;
pub const ERR_NOSUCHNICK: u16 = 401;
pub const ERR_NOSUCHCHANNEL: u16 = 403;
pub const ERR_ERRONEUSNICKNAME: u16 = 432;
pub const ERR_NICKNAMEINUSE: u16 = 433;
pub const ERR_INVITEONLYCHAN: u16 = 473;
pub const ERR_BADCHANNELKEY: u16 = 475;

/// Errors reported to the player as channel notices.
pub const PLAYER_VISIBLE_ERRORS: [u16; 5] = [
    ERR_NOSUCHNICK,
    ERR_NOSUCHCHANNEL,
    ERR_NICKNAMEINUSE,
    ERR_INVITEONLYCHAN,
    ERR_BADCHANNELKEY,
];

pub fn is_player_visible_error(code: u16) -> bool {
    PLAYER_VISIBLE_ERRORS.contains(&code)
}
