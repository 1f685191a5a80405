//! Color code translation between IRC and game chat.
//!
//! IRC carries mIRC control codes:
//! - 0x02 bold, 0x1D italic, 0x1F underline, 0x1E strikethrough
//! - 0x03 color, followed by `fg[,bg]` with one or two digits each
//! - 0x04 hex color, followed by `RRGGBB[,RRGGBB]`
//! - 0x0F reset, 0x16 reverse, 0x11 monospace
//!
//! Game chat uses two-character tokens: `§` plus a code (`0-9a-f` colors,
//! `l` bold, `o` italic, `n` underline, `m` strikethrough, `r` reset).
//! A game color token also clears any active style, so styles are
//! re-emitted after every color change.

use std::borrow::Cow;
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

/// Prefix of every game chat token.
pub const TOKEN_PREFIX: char = '§';

const BOLD: char = '\x02';
const COLOR: char = '\x03';
const HEX_COLOR: char = '\x04';
const RESET: char = '\x0F';
const MONOSPACE: char = '\x11';
const REVERSE: char = '\x16';
const ITALIC: char = '\x1D';
const STRIKETHROUGH: char = '\x1E';
const UNDERLINE: char = '\x1F';

/// IRC control characters handled by the translator.
const IRC_CONTROL_CHARS: &[char] = &[
    BOLD,
    COLOR,
    HEX_COLOR,
    RESET,
    MONOSPACE,
    REVERSE,
    ITALIC,
    STRIKETHROUGH,
    UNDERLINE,
];

/// mIRC "default color" index.
const IRC_DEFAULT_COLOR: u8 = 99;

/// The sixteen game chat colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameColor {
    Black,
    DarkBlue,
    DarkGreen,
    DarkAqua,
    DarkRed,
    DarkPurple,
    Gold,
    Gray,
    DarkGray,
    Blue,
    Green,
    Aqua,
    Red,
    LightPurple,
    Yellow,
    White,
}

impl GameColor {
    /// The token code character.
    pub fn code(self) -> char {
        match self {
            Self::Black => '0',
            Self::DarkBlue => '1',
            Self::DarkGreen => '2',
            Self::DarkAqua => '3',
            Self::DarkRed => '4',
            Self::DarkPurple => '5',
            Self::Gold => '6',
            Self::Gray => '7',
            Self::DarkGray => '8',
            Self::Blue => '9',
            Self::Green => 'a',
            Self::Aqua => 'b',
            Self::Red => 'c',
            Self::LightPurple => 'd',
            Self::Yellow => 'e',
            Self::White => 'f',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code.to_ascii_lowercase() {
            '0' => Some(Self::Black),
            '1' => Some(Self::DarkBlue),
            '2' => Some(Self::DarkGreen),
            '3' => Some(Self::DarkAqua),
            '4' => Some(Self::DarkRed),
            '5' => Some(Self::DarkPurple),
            '6' => Some(Self::Gold),
            '7' => Some(Self::Gray),
            '8' => Some(Self::DarkGray),
            '9' => Some(Self::Blue),
            'a' => Some(Self::Green),
            'b' => Some(Self::Aqua),
            'c' => Some(Self::Red),
            'd' => Some(Self::LightPurple),
            'e' => Some(Self::Yellow),
            'f' => Some(Self::White),
            _ => None,
        }
    }

    /// Map an mIRC palette index (0-15) to the closest game color.
    pub fn from_irc(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::White),
            1 => Some(Self::Black),
            2 => Some(Self::DarkBlue),
            3 => Some(Self::DarkGreen),
            4 => Some(Self::Red),
            5 => Some(Self::DarkRed),
            6 => Some(Self::DarkPurple),
            7 => Some(Self::Gold),
            8 => Some(Self::Yellow),
            9 => Some(Self::Green),
            10 => Some(Self::DarkAqua),
            11 => Some(Self::Aqua),
            12 => Some(Self::Blue),
            13 => Some(Self::LightPurple),
            14 => Some(Self::DarkGray),
            15 => Some(Self::Gray),
            _ => None,
        }
    }

    /// Inverse of `from_irc`.
    pub fn to_irc(self) -> u8 {
        match self {
            Self::White => 0,
            Self::Black => 1,
            Self::DarkBlue => 2,
            Self::DarkGreen => 3,
            Self::Red => 4,
            Self::DarkRed => 5,
            Self::DarkPurple => 6,
            Self::Gold => 7,
            Self::Yellow => 8,
            Self::Green => 9,
            Self::DarkAqua => 10,
            Self::Aqua => 11,
            Self::Blue => 12,
            Self::LightPurple => 13,
            Self::DarkGray => 14,
            Self::Gray => 15,
        }
    }
}

impl fmt::Display for GameColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", TOKEN_PREFIX, self.code())
    }
}

/// Text styles that survive a color change only if re-emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Bold,
    Italic,
    Underline,
    Strikethrough,
}

impl Style {
    const ALL: [Style; 4] = [Style::Bold, Style::Italic, Style::Underline, Style::Strikethrough];

    fn game_code(self) -> char {
        match self {
            Self::Bold => 'l',
            Self::Italic => 'o',
            Self::Underline => 'n',
            Self::Strikethrough => 'm',
        }
    }

    fn irc_code(self) -> char {
        match self {
            Self::Bold => BOLD,
            Self::Italic => ITALIC,
            Self::Underline => UNDERLINE,
            Self::Strikethrough => STRIKETHROUGH,
        }
    }

    fn from_game_code(code: char) -> Option<Self> {
        match code.to_ascii_lowercase() {
            'l' => Some(Self::Bold),
            'o' => Some(Self::Italic),
            'n' => Some(Self::Underline),
            'm' => Some(Self::Strikethrough),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        match self {
            Self::Bold => 1,
            Self::Italic => 2,
            Self::Underline => 4,
            Self::Strikethrough => 8,
        }
    }
}

/// Formatting state while walking an IRC string.
#[derive(Debug, Default)]
struct GameWriter {
    out: String,
    color: Option<GameColor>,
    styles: u8,
}

impl GameWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            out: String::with_capacity(capacity),
            ..Default::default()
        }
    }

    fn push_token(&mut self, code: char) {
        self.out.push(TOKEN_PREFIX);
        self.out.push(code);
    }

    /// Write the full current state from a clean slate.
    fn restate(&mut self) {
        match self.color {
            Some(color) => self.push_token(color.code()),
            None => self.push_token('r'),
        }
        for style in Style::ALL {
            if self.styles & style.bit() != 0 {
                self.push_token(style.game_code());
            }
        }
    }

    fn toggle(&mut self, style: Style) {
        if self.styles & style.bit() == 0 {
            self.styles |= style.bit();
            self.push_token(style.game_code());
        } else {
            self.styles &= !style.bit();
            self.restate();
        }
    }

    fn set_color(&mut self, color: Option<GameColor>) {
        self.color = color;
        self.restate();
    }

    fn reset(&mut self) {
        self.color = None;
        self.styles = 0;
        self.push_token('r');
    }
}

/// Read up to two decimal digits.
fn read_color_number(chars: &mut Peekable<Chars<'_>>) -> Option<u8> {
    let mut value: Option<u8> = None;
    for _ in 0..2 {
        match chars.peek().and_then(|c| c.to_digit(10)) {
            Some(digit) => {
                chars.next();
                value = Some(value.unwrap_or(0) * 10 + digit as u8);
            }
            None => break,
        }
    }
    value
}

/// Consume `,` plus the following argument if (and only if) the argument is present.
fn skip_background(chars: &mut Peekable<Chars<'_>>, is_arg: fn(&char) -> bool, read: fn(&mut Peekable<Chars<'_>>)) {
    let mut ahead = chars.clone();
    if ahead.next() == Some(',') && ahead.peek().is_some_and(is_arg) {
        chars.next();
        read(chars);
    }
}

fn skip_hex_color(chars: &mut Peekable<Chars<'_>>) {
    for _ in 0..6 {
        if chars.peek().is_some_and(char::is_ascii_hexdigit) {
            chars.next();
        } else {
            break;
        }
    }
}

/// Convert IRC formatting codes into game chat tokens.
///
/// Background colors, reverse, monospace and hex colors have no game
/// equivalent and are dropped. Text without control codes is returned as is.
pub fn from_irc(text: &str) -> Cow<'_, str> {
    if !text.contains(IRC_CONTROL_CHARS) {
        return Cow::Borrowed(text);
    }

    let mut writer = GameWriter::with_capacity(text.len() + 8);
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            COLOR => match read_color_number(&mut chars) {
                Some(index) => {
                    skip_background(&mut chars, char::is_ascii_digit, |chars| {
                        read_color_number(chars);
                    });
                    if index == IRC_DEFAULT_COLOR {
                        writer.set_color(None);
                    } else if let Some(color) = GameColor::from_irc(index) {
                        writer.set_color(Some(color));
                    }
                }
                // A bare color code ends the current color
                None => writer.set_color(None),
            },
            HEX_COLOR => {
                if chars.peek().is_some_and(char::is_ascii_hexdigit) {
                    skip_hex_color(&mut chars);
                    skip_background(&mut chars, char::is_ascii_hexdigit, skip_hex_color);
                }
            }
            BOLD => writer.toggle(Style::Bold),
            ITALIC => writer.toggle(Style::Italic),
            UNDERLINE => writer.toggle(Style::Underline),
            STRIKETHROUGH => writer.toggle(Style::Strikethrough),
            RESET => writer.reset(),
            REVERSE | MONOSPACE => {}
            _ => writer.out.push(c),
        }
    }

    Cow::Owned(writer.out)
}

/// Convert game chat tokens into IRC formatting codes.
///
/// Colors are always written with two digits so a following digit in the
/// text cannot be read as part of the color. Unknown tokens are dropped.
pub fn to_irc(text: &str) -> Cow<'_, str> {
    if !text.contains(TOKEN_PREFIX) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 8);
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        if c != TOKEN_PREFIX {
            out.push(c);
            continue;
        }
        let Some(code) = chars.next() else {
            break;
        };
        if let Some(color) = GameColor::from_code(code) {
            out.push(COLOR);
            out.push_str(&format!("{:02}", color.to_irc()));
        } else if let Some(style) = Style::from_game_code(code) {
            out.push(style.irc_code());
        } else if code.eq_ignore_ascii_case(&'r') {
            out.push(RESET);
        }
    }

    Cow::Owned(out)
}

/// Byte length of the `\x03fg[,bg]` sequence starting at `start`.
fn color_sequence_len(bytes: &[u8], start: usize) -> usize {
    let digits = |from: usize| {
        bytes
            .get(from..)
            .unwrap_or_default()
            .iter()
            .take(2)
            .take_while(|b| b.is_ascii_digit())
            .count()
    };

    let mut end = start + 1;
    let fg = digits(end);
    end += fg;
    if fg > 0 && bytes.get(end) == Some(&b',') && bytes.get(end + 1).is_some_and(u8::is_ascii_digit) {
        end += 1 + digits(end + 1);
    }
    end - start
}

/// Move a split point back so it does not land inside a color sequence.
///
/// `at` must be a char boundary of `text`.
pub fn color_safe_boundary(text: &str, at: usize) -> usize {
    let bytes = text.as_bytes();
    // The longest sequence, `\x03NN,NN`, is six bytes
    let window = at.saturating_sub(5);
    match bytes[window..at].iter().rposition(|&b| b == COLOR as u8) {
        Some(offset) if window + offset + color_sequence_len(bytes, window + offset) > at => {
            window + offset
        }
        _ => at,
    }
}

/// Remove game chat tokens entirely, for plain-text sinks such as a terminal.
pub fn strip_tokens(text: &str) -> Cow<'_, str> {
    if !text.contains(TOKEN_PREFIX) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == TOKEN_PREFIX {
            chars.next();
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}
