//! Error types for the IRC bridge

use std::time::Duration;
use thiserror::Error;

/// Main error type for the IRC bridge
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No welcome from server within {}s", .0.as_secs())]
    RegistrationTimeout(Duration),

    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("Transport error: {0}")]
    Transport(#[source] std::io::Error),

    #[error("Session is not registered")]
    NotRegistered,

    #[error("Control store error: {0}")]
    Control(String),
}

impl Error {
    /// Whether this failure should route the daemon into reconnection.
    ///
    /// Only transport-level and handshake failures qualify. Configuration,
    /// control store and state errors are not fixed by dialing again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Connect { .. }
                | Error::RegistrationTimeout(_)
                | Error::ConnectionClosed
                | Error::Transport(_)
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
