//! File-based control surface
//!
//! The external controller talks to the daemon through four sinks: a command
//! source it appends to, an inbox and outbox the daemon appends to, and a
//! status line the daemon overwrites. [`ControlStore`] abstracts the storage
//! so the daemon can run against real files ([`FileStore`]) or memory
//! ([`MemoryStore`]). [`CommandQueue`] layers the command grammar and record
//! formats on top.

use crate::command::Command;
use crate::message::Event;
use crate::status::DaemonStatus;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

pub const COMMANDS_FILE: &str = "commands.txt";
pub const INBOX_FILE: &str = "inbox.txt";
pub const OUTBOX_FILE: &str = "outbox.txt";
pub const STATUS_FILE: &str = "status.txt";

/// Storage behind the control surface
#[async_trait]
pub trait ControlStore: Send + Sync {
    /// Read everything queued on the command source and clear it in one step
    async fn take_commands(&self) -> Result<String>;

    /// Append one record to the inbox
    async fn append_inbox(&self, record: &str) -> Result<()>;

    /// Append one record to the outbox
    async fn append_outbox(&self, record: &str) -> Result<()>;

    /// Replace the status line
    async fn write_status(&self, status: &str) -> Result<()>;
}

/// Control files inside one directory
#[derive(Debug, Clone)]
pub struct FileStore {
    commands: PathBuf,
    inbox: PathBuf,
    outbox: PathBuf,
    status: PathBuf,
}

impl FileStore {
    /// Open a control directory, creating it and the append-only files
    pub async fn open<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref();
        tokio::fs::create_dir_all(directory).await.map_err(|e| {
            Error::Control(format!("Failed to create control directory {:?}: {}", directory, e))
        })?;

        let store = Self {
            commands: directory.join(COMMANDS_FILE),
            inbox: directory.join(INBOX_FILE),
            outbox: directory.join(OUTBOX_FILE),
            status: directory.join(STATUS_FILE),
        };

        for path in [&store.commands, &store.inbox, &store.outbox] {
            touch(path).await?;
        }

        Ok(store)
    }

    pub fn commands_path(&self) -> &Path {
        &self.commands
    }

    pub fn inbox_path(&self) -> &Path {
        &self.inbox
    }

    pub fn outbox_path(&self) -> &Path {
        &self.outbox
    }

    pub fn status_path(&self) -> &Path {
        &self.status
    }

    fn draining_path(&self) -> PathBuf {
        let mut name = self.commands.as_os_str().to_owned();
        name.push(".draining");
        PathBuf::from(name)
    }
}

async fn touch(path: &Path) -> Result<()> {
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| Error::Control(format!("Failed to open {:?}: {}", path, e)))?;
    Ok(())
}

async fn append_line(path: &Path, record: &str) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| Error::Control(format!("Failed to open {:?}: {}", path, e)))?;
    file.write_all(format!("{}\n", record).as_bytes())
        .await
        .map_err(|e| Error::Control(format!("Failed to append to {:?}: {}", path, e)))?;
    Ok(())
}

async fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Control(format!("Failed to read {:?}: {}", path, e))),
    }
}

#[async_trait]
impl ControlStore for FileStore {
    async fn take_commands(&self) -> Result<String> {
        let draining = self.draining_path();
        let mut taken = Vec::new();

        // Left behind if a previous drain was interrupted
        if let Some(leftover) = read_if_exists(&draining).await? {
            taken.extend_from_slice(&leftover);
            tokio::fs::remove_file(&draining).await?;
        }

        let pending = match tokio::fs::metadata(&self.commands).await {
            Ok(meta) => meta.len() > 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(Error::Control(format!("Failed to stat {:?}: {}", self.commands, e))),
        };

        if pending {
            // Appends racing this rename land in a fresh file for the next drain
            tokio::fs::rename(&self.commands, &draining)
                .await
                .map_err(|e| Error::Control(format!("Failed to claim {:?}: {}", self.commands, e)))?;
            touch(&self.commands).await?;

            if let Some(bytes) = read_if_exists(&draining).await? {
                taken.extend_from_slice(&bytes);
            }
            tokio::fs::remove_file(&draining).await?;
        }

        Ok(String::from_utf8_lossy(&taken).into_owned())
    }

    async fn append_inbox(&self, record: &str) -> Result<()> {
        append_line(&self.inbox, record).await
    }

    async fn append_outbox(&self, record: &str) -> Result<()> {
        append_line(&self.outbox, record).await
    }

    async fn write_status(&self, status: &str) -> Result<()> {
        let mut tmp = self.status.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, format!("{}\n", status))
            .await
            .map_err(|e| Error::Control(format!("Failed to write {:?}: {}", tmp, e)))?;
        tokio::fs::rename(&tmp, &self.status)
            .await
            .map_err(|e| Error::Control(format!("Failed to replace {:?}: {}", self.status, e)))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    commands: String,
    inbox: Vec<String>,
    outbox: Vec<String>,
    status_history: Vec<String>,
}

/// In-memory control store; clones share state
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line to the command source, as a controller would
    pub fn push_command(&self, line: &str) {
        let mut state = self.state.lock();
        state.commands.push_str(line);
        state.commands.push('\n');
    }

    pub fn inbox(&self) -> Vec<String> {
        self.state.lock().inbox.clone()
    }

    pub fn outbox(&self) -> Vec<String> {
        self.state.lock().outbox.clone()
    }

    /// Current status line, if any was written
    pub fn status(&self) -> Option<String> {
        self.state.lock().status_history.last().cloned()
    }

    /// Every status line written, oldest first
    pub fn status_history(&self) -> Vec<String> {
        self.state.lock().status_history.clone()
    }
}

#[async_trait]
impl ControlStore for MemoryStore {
    async fn take_commands(&self) -> Result<String> {
        Ok(std::mem::take(&mut self.state.lock().commands))
    }

    async fn append_inbox(&self, record: &str) -> Result<()> {
        self.state.lock().inbox.push(record.to_string());
        Ok(())
    }

    async fn append_outbox(&self, record: &str) -> Result<()> {
        self.state.lock().outbox.push(record.to_string());
        Ok(())
    }

    async fn write_status(&self, status: &str) -> Result<()> {
        self.state.lock().status_history.push(status.to_string());
        Ok(())
    }
}

/// Command intake and record sinks for the daemon
#[derive(Clone)]
pub struct CommandQueue {
    store: Arc<dyn ControlStore>,
}

impl CommandQueue {
    pub fn new(store: Arc<dyn ControlStore>) -> Self {
        Self { store }
    }

    /// Take and parse every pending command, oldest first.
    ///
    /// A store failure yields no commands; the next poll tries again.
    pub async fn drain(&self) -> Vec<Command> {
        match self.store.take_commands().await {
            Ok(source) => Command::parse_all(&source),
            Err(e) => {
                tracing::warn!("Failed to read command source: {}", e);
                Vec::new()
            }
        }
    }

    /// Record a chat, join or part event in the inbox
    pub async fn log_inbound(&self, event: &Event, timestamp: DateTime<Local>) {
        if let Some(record) = inbox_record(event, timestamp) {
            if let Err(e) = self.store.append_inbox(&record).await {
                tracing::warn!("Failed to append to inbox: {}", e);
            }
        }
    }

    /// Record a raw line we sent
    pub async fn log_outbound(&self, line: &str, timestamp: DateTime<Utc>) {
        if let Err(e) = self.store.append_outbox(&outbox_record(line, timestamp)).await {
            tracing::warn!("Failed to append to outbox: {}", e);
        }
    }

    /// Overwrite the status sink
    pub async fn write_status(&self, status: &DaemonStatus) {
        tracing::debug!("Status: {}", status);
        if let Err(e) = self.store.write_status(&status.to_string()).await {
            tracing::warn!("Failed to write status: {}", e);
        }
    }
}

/// Inbox record for an event, `None` for events the inbox does not keep
pub fn inbox_record(event: &Event, timestamp: DateTime<Local>) -> Option<String> {
    let ts = timestamp.format("%Y-%m-%d %H:%M:%S");
    match event {
        Event::ChatMessage { sender, target, text } => {
            Some(format!("{} | {} -> {}: {}", ts, sender, target, text))
        }
        Event::Join { user, channel } => Some(format!("{} | SYSTEM: {} joined {}", ts, user, channel)),
        Event::Part { user, channel } => Some(format!("{} | SYSTEM: {} left {}", ts, user, channel)),
        Event::Ping(_) | Event::Welcome | Event::Unrecognized(_) => None,
    }
}

/// Outbox record: epoch seconds with microseconds, then the line
pub fn outbox_record(line: &str, timestamp: DateTime<Utc>) -> String {
    format!(
        "{}.{:06} -> {}",
        timestamp.timestamp(),
        timestamp.timestamp_subsec_micros(),
        line
    )
}
