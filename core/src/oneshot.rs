//! Connect, deliver a single message, disconnect

use crate::connection::{Inbound, Session, SessionSettings};
use crate::control::CommandQueue;
use crate::message::{Event, MinimalParser};
use crate::transport::Connector;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// How long to keep reading after JOIN and after PRIVMSG
pub const SETTLE_TIME: Duration = Duration::from_secs(1);

/// QUIT reason for a one-off delivery
pub const QUIT_MESSAGE: &str = "Goodbye";

/// Register, join `channel`, send `text` to it, then quit.
///
/// Outbound lines go to `control`'s outbox like they do for the daemon. The
/// session quits with [`QUIT_MESSAGE`] rather than the daemon's reason.
pub async fn send_once(
    connector: &dyn Connector,
    settings: &SessionSettings,
    control: CommandQueue,
    channel: &str,
    text: &str,
) -> Result<()> {
    let settings = SessionSettings {
        quit_message: QUIT_MESSAGE.to_string(),
        ..settings.clone()
    };
    let mut session = Session::connect(connector, &settings, Arc::new(MinimalParser), control).await?;

    session.join_channel(channel).await?;
    settle(&mut session).await?;

    session.send_message(channel, text).await?;
    tracing::info!("Sent to {}: {}", channel, text);
    settle(&mut session).await?;

    session.close().await;
    Ok(())
}

/// Give the server a moment to respond, answering any PINGs
async fn settle(session: &mut Session) -> Result<()> {
    let deadline = Instant::now() + SETTLE_TIME;
    while Instant::now() < deadline {
        match session.next_events().await? {
            Inbound::Events(events) => {
                for event in events {
                    if let Event::Ping(token) = event {
                        session.pong(&token).await?;
                    }
                }
            }
            Inbound::Eof => return Err(crate::Error::ConnectionClosed),
            Inbound::Idle => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::MemoryStore;
    use crate::transport::{StreamTransport, Transport};
    use crate::Error;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    struct OneShotConnector(Mutex<Option<DuplexStream>>);

    #[async_trait]
    impl Connector for OneShotConnector {
        async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn Transport>> {
            self.0
                .lock()
                .take()
                .map(|stream| Box::new(StreamTransport::new(stream)) as Box<dyn Transport>)
                .ok_or_else(|| Error::Connect {
                    addr: format!("{}:{}", host, port),
                    source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
                })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_once() {
        let (client, server) = tokio::io::duplex(8192);
        let (read, mut write) = tokio::io::split(server);

        let server_task = tokio::spawn(async move {
            let mut lines = BufReader::new(read).lines();
            let mut seen = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.starts_with("USER") {
                    write.write_all(b":srv 001 bot :Welcome\r\nPING :mid\r\n").await.unwrap();
                }
                let quit = line.starts_with("QUIT");
                seen.push(line);
                if quit {
                    break;
                }
            }
            seen
        });

        let store = MemoryStore::new();
        let settings = SessionSettings {
            nickname: "bot".to_string(),
            ..SessionSettings::default()
        };
        let connector = OneShotConnector(Mutex::new(Some(client)));
        send_once(&connector, &settings, CommandQueue::new(Arc::new(store)), "#agents", "Hello!")
            .await
            .unwrap();

        let seen = server_task.await.unwrap();
        assert_eq!(
            seen,
            vec![
                "NICK bot",
                "USER bot 0 * :bot",
                "JOIN #agents",
                "PONG :mid",
                "PRIVMSG #agents :Hello!",
                "QUIT :Goodbye",
            ]
        );
    }
}
