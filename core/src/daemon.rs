//! The bridge control loop
//!
//! [`Daemon`] drives one [`Session`] at a time through the lifecycle
//!
//! ```text
//! Starting -> Connecting -> Running <-> Reconnecting
//!                  |            |            |
//!                Failed         +-> Stopping <+-> Stopped
//! ```
//!
//! Each `Running` iteration drains the command queue first, then performs a
//! single bounded read from the server, then checks keepalive. The read
//! timeout is the only place the loop waits, so neither the server nor the
//! controller can starve the other.
//!
//! While `Reconnecting` the queue is still polled once per read timeout. A
//! Quit stops the daemon; other commands wait for the next session.

use crate::buffer::KeepaliveTimer;
use crate::command::Command;
use crate::config::Config;
use crate::connection::{Inbound, Session, SessionSettings};
use crate::control::{CommandQueue, ControlStore};
use crate::message::{Event, LineParser, MinimalParser};
use crate::reconnect::{ReconnectPolicy, ReconnectState};
use crate::status::{DaemonPhase, DaemonStatus};
use crate::transport::Connector;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Local;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Token sent with our own keepalive PINGs
pub const KEEPALIVE_TOKEN: &str = "keepalive";

/// Keepalive probes allowed to go unanswered before the peer is presumed dead
pub const MAX_UNANSWERED_PROBES: u32 = 2;

/// Hook for reacting to server events
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Called for every event except PINGs, which the daemon answers itself.
    /// Returned commands run immediately, in order, like queued ones.
    async fn handle_event(&mut self, event: &Event) -> Vec<Command>;
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonOutcome {
    /// Successful reconnects after the first connect
    pub reconnects: u32,
}

enum Flow {
    Continue,
    Stop,
}

enum Served {
    /// Quit command or shutdown request
    Stop,
    /// Connection lost; reconnect
    Lost(Error),
}

/// The bridge daemon
pub struct Daemon {
    settings: SessionSettings,
    channel: String,
    server_address: String,
    keepalive_interval: Duration,
    startup_attempts: u32,
    connector: Arc<dyn Connector>,
    control: CommandQueue,
    policy: Box<dyn ReconnectPolicy>,
    parser: Arc<dyn LineParser>,
    handler: Option<Box<dyn EventHandler>>,
    shutdown: CancellationToken,
    phase: DaemonPhase,
    reconnect: ReconnectState,
    ever_connected: bool,
    /// Commands drained while disconnected, run first on the next session
    deferred: VecDeque<Command>,
}

impl Daemon {
    /// Create a daemon from configuration
    pub fn new(config: &Config, connector: Arc<dyn Connector>, store: Arc<dyn ControlStore>) -> Self {
        Self {
            settings: config.session_settings(),
            channel: config.identity.channel.clone(),
            server_address: config.server_address(),
            keepalive_interval: config.timing.keepalive_interval(),
            startup_attempts: config.timing.startup_attempts,
            connector,
            control: CommandQueue::new(store),
            policy: config.reconnect_policy(),
            parser: Arc::new(MinimalParser),
            handler: None,
            shutdown: CancellationToken::new(),
            phase: DaemonPhase::Starting,
            reconnect: ReconnectState::new(),
            ever_connected: false,
            deferred: VecDeque::new(),
        }
    }

    /// Dispatch events to a handler
    pub fn with_handler(mut self, handler: Box<dyn EventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Replace the line parser
    pub fn with_parser(mut self, parser: Arc<dyn LineParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Replace the reconnect policy
    pub fn with_policy(mut self, policy: Box<dyn ReconnectPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Token that stops the daemon gracefully when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until a Quit command, a shutdown request, or a startup failure
    pub async fn run(mut self) -> Result<DaemonOutcome> {
        self.control.write_status(&DaemonStatus::Starting).await;
        self.transition(DaemonPhase::Connecting);
        self.control
            .write_status(&DaemonStatus::Connecting {
                server: self.server_address.clone(),
            })
            .await;

        let mut session = match self.establish().await? {
            Some(session) => session,
            None => return Ok(self.finish(None).await),
        };

        loop {
            match self.serve(&mut session).await {
                Served::Stop => break,
                Served::Lost(e) => {
                    warn!("Connection lost: {}. Reconnecting...", e);
                    drop(session);

                    if !self.back_off(&e).await {
                        return Ok(self.finish(None).await);
                    }
                    session = match self.establish().await? {
                        Some(session) => session,
                        None => return Ok(self.finish(None).await),
                    };
                }
            }
        }

        Ok(self.finish(Some(session)).await)
    }

    /// Connect until it works, the shutdown token fires, or startup gives up.
    ///
    /// `Ok(None)` means shutdown was requested while connecting.
    async fn establish(&mut self) -> Result<Option<Session>> {
        loop {
            let attempt = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ok(None),
                result = Session::connect(
                    &*self.connector,
                    &self.settings,
                    self.parser.clone(),
                    self.control.clone(),
                ) => result,
            };

            let failure = match attempt {
                Ok(mut session) => match session.join_channel(&self.channel).await {
                    Ok(()) => {
                        self.on_connected();
                        self.control
                            .write_status(&DaemonStatus::Connected {
                                server: self.server_address.clone(),
                                nick: self.settings.nickname.clone(),
                                channel: self.channel.clone(),
                            })
                            .await;
                        info!("Connected as {} in {}", self.settings.nickname, self.channel);
                        return Ok(Some(session));
                    }
                    Err(e) => e,
                },
                Err(e) => e,
            };

            error!("Connection failed: {}", failure);

            // Once connected, every failure is worth another attempt
            let startup = !self.ever_connected;
            if startup && !failure.is_retryable() {
                return Err(self.fail(failure).await);
            }
            if startup && self.startup_attempts != 0 && self.reconnect.failures() + 1 >= self.startup_attempts {
                return Err(self.fail(failure).await);
            }

            if !self.back_off(&failure).await {
                return Ok(None);
            }
        }
    }

    fn on_connected(&mut self) {
        self.reconnect.record_success(self.ever_connected);
        self.ever_connected = true;
        self.transition(DaemonPhase::Running);
    }

    /// Record a failure, publish it, and wait out the policy delay.
    ///
    /// The command queue is polled every read timeout while waiting. Returns
    /// false if a Quit command or the shutdown token arrived.
    async fn back_off(&mut self, reason: &Error) -> bool {
        let attempt = self.reconnect.record_failure();
        self.transition(DaemonPhase::Reconnecting);
        self.control
            .write_status(&DaemonStatus::Reconnecting {
                attempt,
                reason: reason.to_string(),
            })
            .await;

        let delay = self.policy.next_attempt(attempt);
        info!("Retrying in {:?} (attempt {})", delay, attempt);

        let deadline = Instant::now() + delay;
        loop {
            if self.quit_requested().await {
                info!("Quit command received while disconnected");
                return false;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return false,
                _ = tokio::time::sleep(remaining.min(self.settings.read_timeout)) => {}
            }
        }
    }

    /// Drain the queue without a session. Anything but Quit is kept for later.
    async fn quit_requested(&mut self) -> bool {
        for command in self.control.drain().await {
            match command {
                Command::Quit => return true,
                other => {
                    debug!("Holding '{}' until reconnected", other);
                    self.deferred.push_back(other);
                }
            }
        }
        false
    }

    async fn fail(&mut self, e: Error) -> Error {
        self.transition(DaemonPhase::Failed);
        self.control.write_status(&DaemonStatus::Error(e.to_string())).await;
        error!("Giving up: {}", e);
        e
    }

    /// Steady state for one session
    async fn serve(&mut self, session: &mut Session) -> Served {
        let mut keepalive = KeepaliveTimer::new(self.keepalive_interval);

        loop {
            if self.shutdown.is_cancelled() {
                info!("Shutdown requested");
                return Served::Stop;
            }

            // Outbound first so a busy server cannot starve the controller
            let mut batch = std::mem::take(&mut self.deferred);
            batch.extend(self.control.drain().await);
            while let Some(command) = batch.pop_front() {
                match self.execute(session, command).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Stop) => return Served::Stop,
                    Err(e) if e.is_retryable() => {
                        self.deferred = batch;
                        return Served::Lost(e);
                    }
                    Err(e) => warn!("Command failed: {}", e),
                }
            }

            let inbound = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested");
                    return Served::Stop;
                }
                inbound = session.next_events() => inbound,
            };

            match inbound {
                Ok(Inbound::Events(events)) => {
                    keepalive.record_activity();
                    for event in events {
                        match self.dispatch(session, event).await {
                            Ok(Flow::Continue) => {}
                            Ok(Flow::Stop) => return Served::Stop,
                            Err(e) if e.is_retryable() => return Served::Lost(e),
                            Err(e) => warn!("Event handling failed: {}", e),
                        }
                    }
                }
                Ok(Inbound::Eof) => return Served::Lost(Error::ConnectionClosed),
                Ok(Inbound::Idle) => {}
                Err(e) if e.is_retryable() => return Served::Lost(e),
                Err(e) => warn!("Read failed: {}", e),
            }

            if keepalive.should_probe() {
                if keepalive.unanswered_probes() >= MAX_UNANSWERED_PROBES {
                    return Served::Lost(Error::Transport(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("no reply to {} keepalive probes", MAX_UNANSWERED_PROBES),
                    )));
                }
                debug!("Idle for {:?}, probing server", keepalive.idle_for());
                if let Err(e) = session.ping(KEEPALIVE_TOKEN).await {
                    return Served::Lost(e);
                }
                keepalive.record_probe();
            }
        }
    }

    async fn execute(&mut self, session: &mut Session, command: Command) -> Result<Flow> {
        match command {
            Command::Send { target, text } => {
                session.send_message(&target, &text).await?;
                info!("Sent to {}: {}", target, text);
            }
            Command::JoinChannel { channel } => {
                session.join_channel(&channel).await?;
                info!("Joined {}", channel);
            }
            Command::PartChannel { channel } => {
                session.part_channel(&channel).await?;
                info!("Left {}", channel);
            }
            Command::Quit => {
                info!("Quit command received");
                return Ok(Flow::Stop);
            }
            Command::Unknown(text) => warn!("Unknown command: {}", text),
        }
        Ok(Flow::Continue)
    }

    async fn dispatch(&mut self, session: &mut Session, event: Event) -> Result<Flow> {
        match &event {
            Event::Ping(token) => {
                session.pong(token).await?;
                return Ok(Flow::Continue);
            }
            Event::ChatMessage { sender, target, text } => {
                info!("{} -> {}: {}", sender, target, text);
                self.control.log_inbound(&event, Local::now()).await;
            }
            Event::Join { user, channel } => {
                info!("{} joined {}", user, channel);
                self.control.log_inbound(&event, Local::now()).await;
            }
            Event::Part { user, channel } => {
                info!("{} left {}", user, channel);
                self.control.log_inbound(&event, Local::now()).await;
            }
            Event::Welcome => debug!("Late welcome ignored"),
            Event::Unrecognized(line) => debug!("<- {}", line),
        }

        let commands = match self.handler.as_mut() {
            Some(handler) => handler.handle_event(&event).await,
            None => return Ok(Flow::Continue),
        };

        for command in commands {
            if let Flow::Stop = self.execute(session, command).await? {
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    /// Stopping -> Stopped: best-effort QUIT, close, final status
    async fn finish(&mut self, session: Option<Session>) -> DaemonOutcome {
        self.transition(DaemonPhase::Stopping);
        if let Some(mut session) = session {
            session.close().await;
        }
        self.control.write_status(&DaemonStatus::Stopped).await;
        self.transition(DaemonPhase::Stopped);
        info!("Stopped");

        DaemonOutcome {
            reconnects: self.reconnect.reconnects(),
        }
    }

    fn transition(&mut self, next: DaemonPhase) {
        if !self.phase.can_transition_to(next) {
            warn!("Unexpected phase change {} -> {}", self.phase, next);
        }
        debug!("Phase {} -> {}", self.phase, next);
        self.phase = next;
    }
}
