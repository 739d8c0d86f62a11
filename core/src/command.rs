//! Controller command grammar
//!
//! One line of the command source becomes one [`Command`]:
//!
//! ```text
//! SEND <target> <text...>
//! JOIN <channel>
//! PART <channel>
//! QUIT
//! ```
//!
//! Anything that does not fit degrades to [`Command::Unknown`].

use std::fmt;

/// A request from the external controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send { target: String, text: String },
    JoinChannel { channel: String },
    PartChannel { channel: String },
    Quit,
    Unknown(String),
}

impl Command {
    /// Parse one command line. Surrounding whitespace is ignored.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();

        if line == "QUIT" {
            return Command::Quit;
        }

        if let Some(rest) = line.strip_prefix("SEND ") {
            let mut parts = rest.splitn(2, ' ');
            let target = parts.next().unwrap_or("");
            let text = parts.next().unwrap_or("");
            if target.is_empty() || text.is_empty() {
                return Command::Unknown(line.to_string());
            }
            return Command::Send {
                target: target.to_string(),
                text: text.to_string(),
            };
        }

        if let Some(channel) = line.strip_prefix("JOIN ") {
            return match channel.trim() {
                "" => Command::Unknown(line.to_string()),
                channel => Command::JoinChannel {
                    channel: channel.to_string(),
                },
            };
        }

        if let Some(channel) = line.strip_prefix("PART ") {
            return match channel.trim() {
                "" => Command::Unknown(line.to_string()),
                channel => Command::PartChannel {
                    channel: channel.to_string(),
                },
            };
        }

        Command::Unknown(line.to_string())
    }

    /// Parse every non-blank line of a command source, in order
    pub fn parse_all(source: &str) -> Vec<Self> {
        source
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Command::parse)
            .collect()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Send { target, text } => write!(f, "SEND {} {}", target, text),
            Command::JoinChannel { channel } => write!(f, "JOIN {}", channel),
            Command::PartChannel { channel } => write!(f, "PART {}", channel),
            Command::Quit => write!(f, "QUIT"),
            Command::Unknown(text) => write!(f, "{}", text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send_keeps_spaces_in_text() {
        assert_eq!(
            Command::parse("SEND #agents Hello there, world"),
            Command::Send {
                target: "#agents".to_string(),
                text: "Hello there, world".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_send_without_text_is_unknown() {
        assert_eq!(Command::parse("SEND #agents"), Command::Unknown("SEND #agents".to_string()));
        assert_eq!(Command::parse("SEND"), Command::Unknown("SEND".to_string()));
    }

    #[test]
    fn test_parse_join_part() {
        assert_eq!(
            Command::parse("JOIN #rust"),
            Command::JoinChannel { channel: "#rust".to_string() }
        );
        assert_eq!(
            Command::parse("PART #rust"),
            Command::PartChannel { channel: "#rust".to_string() }
        );
        assert_eq!(Command::parse("JOIN "), Command::Unknown("JOIN".to_string()));
    }

    #[test]
    fn test_parse_quit_is_exact() {
        assert_eq!(Command::parse("QUIT"), Command::Quit);
        assert_eq!(Command::parse("  QUIT \n"), Command::Quit);
        assert_eq!(Command::parse("QUIT now"), Command::Unknown("QUIT now".to_string()));
        assert_eq!(Command::parse("quit"), Command::Unknown("quit".to_string()));
    }

    #[test]
    fn test_parse_all_skips_blank_lines() {
        let commands = Command::parse_all("SEND #a hi\n\n   \nJOIN #b\r\nbogus\nQUIT\n");
        assert_eq!(
            commands,
            vec![
                Command::Send { target: "#a".to_string(), text: "hi".to_string() },
                Command::JoinChannel { channel: "#b".to_string() },
                Command::Unknown("bogus".to_string()),
                Command::Quit,
            ]
        );
    }
}
