//! IRC Bridge Core
//!
//! This crate provides a long-lived IRC client that keeps one channel
//! connection alive and exposes it to an external controller through plain
//! files: a command source it drains, an inbox and outbox it appends to, and
//! a status line it overwrites.

pub mod buffer;
pub mod command;
pub mod config;
pub mod connection;
pub mod control;
pub mod daemon;
pub mod error;
pub mod message;
pub mod oneshot;
pub mod reconnect;
pub mod status;
pub mod transport;

pub use buffer::{KeepaliveTimer, LineFramer};
pub use command::Command;
pub use config::{BackoffKind, Config};
pub use connection::{Inbound, Session, SessionSettings, SessionState};
pub use control::{CommandQueue, ControlStore, FileStore, MemoryStore};
pub use daemon::{Daemon, DaemonOutcome, EventHandler};
pub use error::{Error, Result};
pub use message::{Event, LineParser, MinimalParser, Outbound, RawLine};
pub use oneshot::send_once;
pub use reconnect::{ExponentialBackoff, FixedDelay, ReconnectPolicy, ReconnectState};
pub use status::{DaemonPhase, DaemonStatus};
pub use transport::{Connector, Received, StreamTransport, TcpConnector, TcpTransport, Transport};

/// Re-exports for convenience
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
pub use tracing::{debug, error, info, warn};
