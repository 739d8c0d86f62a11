//! Configuration management

use crate::connection::SessionSettings;
use crate::reconnect::{ExponentialBackoff, FixedDelay, ReconnectPolicy};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server to connect to
    pub server: ServerConfig,
    /// Who we are and where we sit
    pub identity: IdentityConfig,
    /// Control file locations
    pub control: ControlConfig,
    /// Timeouts and retry behaviour
    pub timing: TimingConfig,
    /// Resource limits
    pub limits: LimitsConfig,
}

/// Remote server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server hostname or address
    pub host: String,
    /// Server port
    pub port: u16,
}

/// Nickname and channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Nickname, also used as username and real name
    pub nickname: String,
    /// Channel joined after every successful connect
    pub channel: String,
    /// Reason sent with QUIT on shutdown
    pub quit_message: String,
}

/// Control directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Directory holding commands.txt, inbox.txt, outbox.txt and status.txt
    pub directory: PathBuf,
}

/// Reconnect delay strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Seconds to wait for RPL_WELCOME
    pub registration_timeout_secs: u64,
    /// Milliseconds a single read may block before the loop polls commands again
    pub read_timeout_ms: u64,
    /// Seconds of silence before we PING the server
    pub keepalive_interval_secs: u64,
    /// Seconds between reconnect attempts (base delay for exponential backoff)
    pub reconnect_delay_secs: u64,
    /// Upper bound for exponential backoff
    pub reconnect_max_delay_secs: u64,
    /// Delay strategy
    pub backoff: BackoffKind,
    /// Connect attempts before giving up at startup, 0 for unlimited
    pub startup_attempts: u32,
}

/// Limits configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Longest unterminated line we buffer, 0 for no limit
    pub max_line_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6667,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            nickname: "ircbridge".to_string(),
            channel: "#agents".to_string(),
            quit_message: "Daemon stopped".to_string(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("/tmp/irc_control"),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            registration_timeout_secs: 30,
            read_timeout_ms: 1000,
            keepalive_interval_secs: 120,
            reconnect_delay_secs: 5,
            reconnect_max_delay_secs: 300,
            backoff: BackoffKind::Fixed,
            startup_attempts: 1,
        }
    }
}

impl TimingConfig {
    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.registration_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content).map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(Error::Config("Server host cannot be empty".to_string()));
        }

        if self.server.port == 0 {
            return Err(Error::Config("Port cannot be 0".to_string()));
        }

        let nickname = &self.identity.nickname;
        if nickname.is_empty() || nickname.contains(char::is_whitespace) || nickname.starts_with(':') {
            return Err(Error::Config(format!("Invalid nickname {:?}", nickname)));
        }

        let channel = &self.identity.channel;
        if !(channel.starts_with('#') || channel.starts_with('&')) || channel.len() < 2 || channel.contains(' ') {
            return Err(Error::Config(format!("Invalid channel name {:?}", channel)));
        }

        if self.timing.registration_timeout_secs == 0 {
            return Err(Error::Config("Registration timeout must be greater than 0".to_string()));
        }

        if self.timing.read_timeout_ms == 0 {
            return Err(Error::Config("Read timeout must be greater than 0".to_string()));
        }

        if self.timing.keepalive_interval_secs == 0 {
            return Err(Error::Config("Keepalive interval must be greater than 0".to_string()));
        }

        if self.timing.backoff == BackoffKind::Exponential
            && self.timing.reconnect_max_delay_secs < self.timing.reconnect_delay_secs
        {
            return Err(Error::Config(
                "Maximum reconnect delay must not be smaller than the base delay".to_string(),
            ));
        }

        Ok(())
    }

    /// Reconnect policy described by the timing section
    pub fn reconnect_policy(&self) -> Box<dyn ReconnectPolicy> {
        let base = Duration::from_secs(self.timing.reconnect_delay_secs);
        match self.timing.backoff {
            BackoffKind::Fixed => Box::new(FixedDelay::new(base)),
            BackoffKind::Exponential => Box::new(ExponentialBackoff::new(
                base,
                Duration::from_secs(self.timing.reconnect_max_delay_secs),
            )),
        }
    }

    /// Parameters for each connect attempt
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            host: self.server.host.clone(),
            port: self.server.port,
            nickname: self.identity.nickname.clone(),
            registration_timeout: self.timing.registration_timeout(),
            read_timeout: self.timing.read_timeout(),
            max_line_buffer: self.limits.max_line_buffer,
            quit_message: self.identity.quit_message.clone(),
        }
    }

    /// `host:port` for status lines and logs
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
