//! Inbound framing and keepalive timing
//!
//! [`LineFramer`] turns the raw byte chunks a transport hands us into
//! complete IRC lines, and [`KeepaliveTimer`] tracks inbound activity so the
//! daemon knows when to probe a silent server with its own PING.

use crate::message::RawLine;
use std::time::Duration;
use tokio::time::Instant;

/// IRC line terminator
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Accumulates byte chunks and yields CR LF delimited lines
#[derive(Debug, Default)]
pub struct LineFramer {
    /// Bytes received but not yet terminated
    buffer: Vec<u8>,
    /// Maximum unterminated bytes to hold, 0 for no limit
    max_buffer: usize,
    /// Bytes thrown away because a fragment outgrew `max_buffer`
    dropped_bytes: u64,
    /// Set after an overflow until the next terminator resynchronises us
    discarding: bool,
}

impl LineFramer {
    /// Create a framer with no buffer limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a framer that discards any unterminated fragment longer than
    /// `max_buffer` bytes. A limit of 0 means unbounded.
    pub fn with_max_buffer(max_buffer: usize) -> Self {
        Self {
            max_buffer,
            ..Self::default()
        }
    }

    /// Append a chunk and return every line it completed.
    ///
    /// Only the new bytes (plus one byte of overlap for a split CR LF) are
    /// scanned, so a long unterminated fragment costs linear time overall.
    pub fn feed(&mut self, data: &[u8]) -> Vec<RawLine> {
        let mut from = self.buffer.len().saturating_sub(LINE_TERMINATOR.len() - 1);
        self.buffer.extend_from_slice(data);

        // Start of the line currently being extracted
        let mut start = 0;

        if self.discarding {
            match find_terminator(&self.buffer, from) {
                Some(pos) => {
                    self.dropped_bytes += pos as u64;
                    start = pos + LINE_TERMINATOR.len();
                    from = start;
                    self.discarding = false;
                }
                None => {
                    self.drop_pending();
                    return Vec::new();
                }
            }
        }

        let mut lines = Vec::new();
        while let Some(pos) = find_terminator(&self.buffer, from) {
            lines.push(RawLine::new(self.buffer[start..pos].to_vec()));
            start = pos + LINE_TERMINATOR.len();
            from = start;
        }
        self.buffer.drain(..start);

        if self.max_buffer > 0 && self.buffer.len() > self.max_buffer {
            tracing::warn!(
                "Unterminated input exceeded {} bytes, discarding {} bytes until next line",
                self.max_buffer,
                self.buffer.len()
            );
            self.drop_pending();
            self.discarding = true;
        }

        lines
    }

    /// Throw away the pending fragment, keeping a trailing CR that may be the
    /// first half of a terminator split across chunks.
    fn drop_pending(&mut self) {
        let keep_cr = self.buffer.last() == Some(&b'\r');
        let dropped = self.buffer.len() - usize::from(keep_cr);
        self.dropped_bytes += dropped as u64;
        self.buffer.clear();
        if keep_cr {
            self.buffer.push(b'\r');
        }
    }

    /// Number of buffered bytes still waiting for a terminator
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes discarded because of the buffer limit
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes
    }

    /// Forget any buffered fragment
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }
}

/// Position of the first terminator at or after `from`
fn find_terminator(buffer: &[u8], from: usize) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(LINE_TERMINATOR.len())
        .position(|window| window == LINE_TERMINATOR)
        .map(|pos| pos + from)
}

/// Tracks inbound activity for keepalive probing
#[derive(Debug, Clone)]
pub struct KeepaliveTimer {
    /// Last time the server sent us anything, or we probed it
    last_activity: Instant,
    /// Silence allowed before we probe
    interval: Duration,
    /// Probes sent since the server last spoke
    unanswered_probes: u32,
}

impl KeepaliveTimer {
    /// Create a timer that starts counting now
    pub fn new(interval: Duration) -> Self {
        Self {
            last_activity: Instant::now(),
            interval,
            unanswered_probes: 0,
        }
    }

    /// Record inbound data from the server
    pub fn record_activity(&mut self) {
        self.last_activity = Instant::now();
        self.unanswered_probes = 0;
    }

    /// Record that we sent a keepalive PING
    pub fn record_probe(&mut self) {
        self.last_activity = Instant::now();
        self.unanswered_probes += 1;
    }

    /// Whether the line has been silent for longer than the interval
    pub fn should_probe(&self) -> bool {
        self.last_activity.elapsed() > self.interval
    }

    /// Probes sent without any reply in between
    pub fn unanswered_probes(&self) -> u32 {
        self.unanswered_probes
    }

    /// Time since the last recorded activity
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}
