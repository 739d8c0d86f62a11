//! IRC line classification and outbound line formatting
//!
//! Inbound classification is deliberately shallow: it looks for keywords
//! anywhere in the line rather than parsing the command position. That is
//! enough for connect/join/message/ping traffic and keeps the daemon honest
//! about what it understands. A stricter parser can implement
//! [`LineParser`] and be handed to the daemon instead.

use std::borrow::Cow;
use std::fmt;

/// One protocol line with its terminator stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine(Vec<u8>);

impl RawLine {
    /// Wrap bytes that are already terminator-free
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw bytes of the line
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Line decoded as UTF-8, replacing invalid sequences
    pub fn to_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl From<&str> for RawLine {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl fmt::Display for RawLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

/// Classified inbound line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Server keepalive probe
    Ping(String),
    /// PRIVMSG to a channel or to us
    ChatMessage {
        sender: String,
        target: String,
        text: String,
    },
    /// Someone joined a channel
    Join { user: String, channel: String },
    /// Someone left a channel
    Part { user: String, channel: String },
    /// RPL_WELCOME, registration is complete
    Welcome,
    /// Anything else
    Unrecognized(RawLine),
}

/// Turns raw lines into events
pub trait LineParser: Send + Sync {
    fn parse(&self, line: RawLine) -> Event;
}

/// Keyword-matching parser for the minimal IRC subset
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimalParser;

impl LineParser for MinimalParser {
    fn parse(&self, line: RawLine) -> Event {
        parse_line(line)
    }
}

/// Classify a line using the minimal keyword rules
pub fn parse_line(line: RawLine) -> Event {
    let classified = {
        let text = line.to_text();
        classify(&text)
    };
    classified.unwrap_or(Event::Unrecognized(line))
}

fn classify(line: &str) -> Option<Event> {
    if let Some(rest) = line.strip_prefix("PING") {
        let token = rest.strip_prefix(' ').unwrap_or(rest);
        let token = token.strip_prefix(':').unwrap_or(token);
        return Some(Event::Ping(token.to_string()));
    }

    if line.split_whitespace().any(|word| word == "PRIVMSG") {
        let parts: Vec<&str> = line.splitn(4, ' ').collect();
        if parts.len() < 4 {
            return None;
        }
        let text = parts[3].strip_prefix(':').unwrap_or(parts[3]);
        return Some(Event::ChatMessage {
            sender: nick_from_prefix(parts[0]),
            target: parts[2].to_string(),
            text: text.to_string(),
        });
    }

    if line.contains("JOIN") {
        let parts: Vec<&str> = line.split(' ').collect();
        if parts.len() < 3 {
            return None;
        }
        let channel = parts[2].strip_prefix(':').unwrap_or(parts[2]);
        return Some(Event::Join {
            user: nick_from_prefix(parts[0]),
            channel: channel.to_string(),
        });
    }

    // The channel keeps any leading ':' here, unlike JOIN above
    if line.contains("PART") {
        let parts: Vec<&str> = line.split(' ').collect();
        if parts.len() < 3 {
            return None;
        }
        return Some(Event::Part {
            user: nick_from_prefix(parts[0]),
            channel: parts[2].to_string(),
        });
    }

    if line.contains(" 001 ") {
        return Some(Event::Welcome);
    }

    None
}

/// `:nick!user@host` -> `nick`
fn nick_from_prefix(prefix: &str) -> String {
    let prefix = prefix.strip_prefix(':').unwrap_or(prefix);
    prefix.split('!').next().unwrap_or(prefix).to_string()
}

/// Lines the bridge sends to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Nick(String),
    /// `USER <nick> 0 * :<nick>`
    User(String),
    Join(String),
    Part(String),
    PrivMsg { target: String, text: String },
    Ping(String),
    Pong(String),
    Quit(String),
}

impl fmt::Display for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outbound::Nick(nick) => write!(f, "NICK {}", nick),
            Outbound::User(nick) => write!(f, "USER {} 0 * :{}", nick, nick),
            Outbound::Join(channel) => write!(f, "JOIN {}", channel),
            Outbound::Part(channel) => write!(f, "PART {}", channel),
            Outbound::PrivMsg { target, text } => write!(f, "PRIVMSG {} :{}", target, text),
            Outbound::Ping(token) => write!(f, "PING :{}", token),
            Outbound::Pong(token) => write!(f, "PONG :{}", token),
            Outbound::Quit(reason) => write!(f, "QUIT :{}", reason),
        }
    }
}
