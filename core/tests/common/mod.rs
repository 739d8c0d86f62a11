//! Shared test fixtures: a scripted connector and a scripted in-memory server

#![allow(dead_code)]

use ircbridge_core::*;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;
use tokio::time::Instant;

enum Step {
    Refuse,
    Break,
    Accept(DuplexStream),
}

/// Connector that follows a plan: refuse, or hand out an in-memory stream.
/// Once the plan runs out every attempt is refused.
#[derive(Default)]
pub struct ScriptedConnector {
    plan: Mutex<VecDeque<Step>>,
    attempts: Mutex<Vec<Instant>>,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Next attempt is refused
    pub fn refuse(&self) {
        self.plan.lock().push_back(Step::Refuse);
    }

    /// Next attempt fails with an error that is not a connect failure
    pub fn break_next(&self) {
        self.plan.lock().push_back(Step::Break);
    }

    /// Next attempt succeeds; returns the server's end of the stream
    pub fn accept(&self) -> FakeServer {
        let (client, server) = tokio::io::duplex(64 * 1024);
        self.plan.lock().push_back(Step::Accept(client));
        FakeServer::spawn(server, true)
    }

    /// Like [`accept`](Self::accept), but the server never answers PINGs
    pub fn accept_unresponsive(&self) -> FakeServer {
        let (client, server) = tokio::io::duplex(64 * 1024);
        self.plan.lock().push_back(Step::Accept(client));
        FakeServer::spawn(server, false)
    }

    /// When each attempt happened
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn Transport>> {
        self.attempts.lock().push(Instant::now());
        let step = self.plan.lock().pop_front();
        match step {
            Some(Step::Accept(stream)) => Ok(Box::new(StreamTransport::new(stream))),
            Some(Step::Break) => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "resolver unavailable",
            ))),
            Some(Step::Refuse) | None => Err(Error::Connect {
                addr: format!("{}:{}", host, port),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            }),
        }
    }
}

enum Action {
    Send(Vec<u8>),
    Close,
}

/// Minimal IRC server: welcomes after USER, answers PINGs, records lines
pub struct FakeServer {
    received: Arc<Mutex<Vec<String>>>,
    tx: mpsc::UnboundedSender<Action>,
}

impl FakeServer {
    fn spawn(stream: DuplexStream, answer_pings: bool) -> Self {
        let (read, mut write) = tokio::io::split(stream);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let received = Arc::new(Mutex::new(Vec::new()));

        tokio::spawn(async move {
            while let Some(action) = rx.recv().await {
                match action {
                    Action::Send(bytes) => {
                        if write.write_all(&bytes).await.is_err() {
                            break;
                        }
                    }
                    Action::Close => {
                        let _ = write.shutdown().await;
                        break;
                    }
                }
            }
        });

        let reader_tx = tx.clone();
        let reader_received = received.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.starts_with("USER ") {
                    let nick = line.split(' ').nth(1).unwrap_or("*").to_string();
                    let welcome = format!(":irc.test 001 {} :Welcome to the test network\r\n", nick);
                    let _ = reader_tx.send(Action::Send(welcome.into_bytes()));
                }
                if let Some(token) = line.strip_prefix("PING ").filter(|_| answer_pings) {
                    let pong = format!(":irc.test PONG irc.test {}\r\n", token);
                    let _ = reader_tx.send(Action::Send(pong.into_bytes()));
                }
                reader_received.lock().push(line);
            }
        });

        Self { received, tx }
    }

    /// Write raw bytes to the client
    pub fn send(&self, data: &str) {
        let _ = self.tx.send(Action::Send(data.as_bytes().to_vec()));
    }

    /// Close the server's side of the connection
    pub fn close(&self) {
        let _ = self.tx.send(Action::Close);
    }

    /// Lines received from the client so far
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    pub fn has_received(&self, line: &str) -> bool {
        self.received.lock().iter().any(|l| l == line)
    }
}

/// Poll `condition` until it holds, advancing (possibly paused) time
pub async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    for _ in 0..30_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Config pointed at the fake server
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "irc.test".to_string();
    config.identity.nickname = "bot".to_string();
    config.identity.channel = "#chan".to_string();
    config
}

/// Raw lines from outbox records
pub fn sent_lines(store: &MemoryStore) -> Vec<String> {
    store
        .outbox()
        .iter()
        .filter_map(|record| record.split_once(" -> ").map(|(_, line)| line.to_string()))
        .collect()
}
