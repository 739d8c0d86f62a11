//! Byte-stream transport boundary
//!
//! The session never touches sockets directly. It talks to a [`Transport`]
//! obtained from a [`Connector`], which keeps the protocol logic testable
//! against in-memory streams.

use crate::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Size of a single read from the transport
pub const READ_CHUNK_SIZE: usize = 4096;

/// Outcome of a bounded read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Bytes arrived
    Data(Vec<u8>),
    /// The remote end closed the stream
    Eof,
    /// Nothing arrived before the timeout
    WouldBlock,
}

/// A connected, bidirectional byte stream
#[async_trait]
pub trait Transport: Send {
    /// Write all bytes
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read whatever is available, waiting at most `timeout`
    async fn receive(&mut self, timeout: Duration) -> Result<Received>;

    /// Shut the stream down
    async fn close(&mut self) -> Result<()>;
}

/// Opens transports to a server
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn Transport>>;
}

/// Transport over any tokio stream
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
    read_buf: Box<[u8]>,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_buf: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
        }
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await.map_err(Error::Transport)?;
        self.stream.flush().await.map_err(Error::Transport)
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Received> {
        match tokio::time::timeout(timeout, self.stream.read(&mut self.read_buf)).await {
            Err(_elapsed) => Ok(Received::WouldBlock),
            Ok(Ok(0)) => Ok(Received::Eof),
            Ok(Ok(n)) => Ok(Received::Data(self.read_buf[..n].to_vec())),
            Ok(Err(e)) => Err(Error::Transport(e)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await.map_err(Error::Transport)
    }
}

/// Plain TCP transport
pub type TcpTransport = StreamTransport<TcpStream>;

/// Connects over TCP with a bounded connect time
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn Transport>> {
        let addr = format!("{}:{}", host, port);
        tracing::debug!("Opening TCP connection to {}", addr);

        let stream = match tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(Error::Connect { addr, source }),
            Err(_elapsed) => {
                return Err(Error::Connect {
                    addr,
                    source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
                })
            }
        };
        stream
            .set_nodelay(true)
            .map_err(|source| Error::Connect { addr, source })?;

        Ok(Box::new(TcpTransport::new(stream)))
    }
}
