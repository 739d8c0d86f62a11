//! One registered connection to the IRC server
//!
//! A [`Session`] owns its transport exclusively. It is built fresh by
//! [`Session::connect`] on every connect attempt and thrown away on
//! reconnect, so no state leaks from a dead connection into a new one.

use crate::buffer::LineFramer;
use crate::control::CommandQueue;
use crate::message::{Event, LineParser, Outbound};
use crate::transport::{Connector, Received, Transport};
use crate::{Error, Result};
use chrono::Utc;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Registration state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// NICK/USER sent, no welcome yet
    Unregistered,
    /// Welcome received, channel traffic allowed
    Registered,
    /// Closed locally; every send fails
    Closed,
}

/// Parameters for a connect attempt
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub host: String,
    pub port: u16,
    pub nickname: String,
    /// Deadline for RPL_WELCOME
    pub registration_timeout: Duration,
    /// Bound on a single steady-state read
    pub read_timeout: Duration,
    /// Longest unterminated line buffered, 0 for no limit
    pub max_line_buffer: usize,
    pub quit_message: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6667,
            nickname: "ircbridge".to_string(),
            registration_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(1),
            max_line_buffer: 0,
            quit_message: "Daemon stopped".to_string(),
        }
    }
}

/// Result of one bounded poll of the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Lines arrived and were classified, possibly none if only a fragment came in
    Events(Vec<Event>),
    /// The server closed the connection
    Eof,
    /// Nothing arrived within the read timeout
    Idle,
}

/// A connection to the server
pub struct Session {
    transport: Box<dyn Transport>,
    framer: LineFramer,
    parser: Arc<dyn LineParser>,
    control: CommandQueue,
    settings: SessionSettings,
    state: SessionState,
    channels: BTreeSet<String>,
    /// Events framed during registration after the welcome line
    pending: VecDeque<Event>,
}

impl Session {
    pub(crate) fn new(
        transport: Box<dyn Transport>,
        settings: SessionSettings,
        parser: Arc<dyn LineParser>,
        control: CommandQueue,
    ) -> Self {
        Self {
            transport,
            framer: LineFramer::with_max_buffer(settings.max_line_buffer),
            parser,
            control,
            settings,
            state: SessionState::Unregistered,
            channels: BTreeSet::new(),
            pending: VecDeque::new(),
        }
    }

    /// Open a transport, register, and wait for the server's welcome
    pub async fn connect(
        connector: &dyn Connector,
        settings: &SessionSettings,
        parser: Arc<dyn LineParser>,
        control: CommandQueue,
    ) -> Result<Self> {
        info!("Connecting to {}:{}...", settings.host, settings.port);
        let transport = connector.connect(&settings.host, settings.port).await?;
        let mut session = Session::new(transport, settings.clone(), parser, control);

        let registered = session.register().await;
        if let Err(e) = registered {
            session.abort().await;
            return Err(e);
        }

        info!("Registered as {} on {}:{}", settings.nickname, settings.host, settings.port);
        Ok(session)
    }

    async fn register(&mut self) -> Result<()> {
        let nick = self.settings.nickname.clone();
        self.send_raw(&Outbound::Nick(nick.clone()).to_string()).await?;
        self.send_raw(&Outbound::User(nick).to_string()).await?;

        debug!("Waiting for server welcome...");
        self.wait_for_welcome().await
    }

    /// Read until RPL_WELCOME, answering PINGs on the way
    async fn wait_for_welcome(&mut self) -> Result<()> {
        let timeout = self.settings.registration_timeout;
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::RegistrationTimeout(timeout));
            }

            let data = match self.transport.receive(remaining).await? {
                Received::Data(data) => data,
                Received::Eof => {
                    info!("Server closed connection during handshake");
                    return Err(Error::ConnectionClosed);
                }
                Received::WouldBlock => continue,
            };

            let mut events = self
                .framer
                .feed(&data)
                .into_iter()
                .map(|line| self.parser.parse(line))
                .collect::<VecDeque<_>>();

            while let Some(event) = events.pop_front() {
                match event {
                    Event::Ping(token) => self.pong(&token).await?,
                    Event::Welcome => {
                        self.state = SessionState::Registered;
                        self.pending.extend(events);
                        return Ok(());
                    }
                    other => debug!("Ignoring pre-registration line: {:?}", other),
                }
            }
        }
    }

    /// Write one line, terminator appended, and record it in the outbox
    pub async fn send_raw(&mut self, line: &str) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(Error::ConnectionClosed);
        }

        self.transport.send(format!("{}\r\n", line).as_bytes()).await?;
        debug!("-> {}", line);
        self.control.log_outbound(line, Utc::now()).await;
        Ok(())
    }

    /// Send a PRIVMSG
    pub async fn send_message(&mut self, target: &str, text: &str) -> Result<()> {
        self.ensure_registered()?;
        self.send_raw(
            &Outbound::PrivMsg {
                target: target.to_string(),
                text: text.to_string(),
            }
            .to_string(),
        )
        .await
    }

    /// Join a channel without waiting for the server to confirm
    pub async fn join_channel(&mut self, channel: &str) -> Result<()> {
        self.ensure_registered()?;
        self.send_raw(&Outbound::Join(channel.to_string()).to_string()).await?;
        self.channels.insert(channel.to_string());
        Ok(())
    }

    /// Leave a channel without waiting for the server to confirm
    pub async fn part_channel(&mut self, channel: &str) -> Result<()> {
        self.ensure_registered()?;
        self.send_raw(&Outbound::Part(channel.to_string()).to_string()).await?;
        self.channels.remove(channel);
        Ok(())
    }

    /// Answer a server PING
    pub async fn pong(&mut self, token: &str) -> Result<()> {
        self.send_raw(&Outbound::Pong(token.to_string()).to_string()).await
    }

    /// Probe the server with our own PING
    pub async fn ping(&mut self, token: &str) -> Result<()> {
        self.send_raw(&Outbound::Ping(token.to_string()).to_string()).await
    }

    /// Bounded read straight from the transport
    pub async fn receive(&mut self, timeout: Duration) -> Result<Received> {
        if self.state == SessionState::Closed {
            return Err(Error::ConnectionClosed);
        }
        self.transport.receive(timeout).await
    }

    /// Read once (bounded by the read timeout), frame and classify.
    ///
    /// Events left over from registration are returned first without reading.
    pub async fn next_events(&mut self) -> Result<Inbound> {
        if !self.pending.is_empty() {
            return Ok(Inbound::Events(self.pending.drain(..).collect()));
        }

        match self.receive(self.settings.read_timeout).await? {
            Received::Data(data) => {
                let events = self
                    .framer
                    .feed(&data)
                    .into_iter()
                    .map(|line| self.parser.parse(line))
                    .collect();
                Ok(Inbound::Events(events))
            }
            Received::Eof => Ok(Inbound::Eof),
            Received::WouldBlock => Ok(Inbound::Idle),
        }
    }

    /// Say goodbye and close. Failures are logged, never returned.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        let quit = Outbound::Quit(self.settings.quit_message.clone()).to_string();
        if let Err(e) = self.send_raw(&quit).await {
            debug!("QUIT not delivered: {}", e);
        }
        self.abort().await;
    }

    /// Close the transport without a QUIT
    async fn abort(&mut self) {
        if let Err(e) = self.transport.close().await {
            debug!("Error closing transport: {}", e);
        }
        self.state = SessionState::Closed;
        self.channels.clear();
    }

    fn ensure_registered(&self) -> Result<()> {
        match self.state {
            SessionState::Registered => Ok(()),
            SessionState::Unregistered => Err(Error::NotRegistered),
            SessionState::Closed => Err(Error::ConnectionClosed),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_registered(&self) -> bool {
        self.state == SessionState::Registered
    }

    pub fn nickname(&self) -> &str {
        &self.settings.nickname
    }

    /// Channels we asked to join and have not parted
    pub fn channels(&self) -> &BTreeSet<String> {
        &self.channels
    }
}
