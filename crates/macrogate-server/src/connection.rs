//! One client connection and its read/write state machine.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use macrogate_protocol::{decode, Command, Decoded};

/// Why a connection was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CloseReason {
    /// The peer closed its end.
    PeerClosed,
    /// No activity within the idle timeout.
    Idle,
    /// The receive buffer grew past the cap.
    BufferOverflow,
    /// The response was fully written.
    Responded,
    /// The server is stopping.
    Shutdown,
    /// A read or write failed.
    Io(io::ErrorKind),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => f.write_str("peer closed"),
            Self::Idle => f.write_str("idle timeout"),
            Self::BufferOverflow => f.write_str("buffer overflow"),
            Self::Responded => f.write_str("response sent"),
            Self::Shutdown => f.write_str("server shutdown"),
            Self::Io(kind) => write!(f, "i/o error: {kind}"),
        }
    }
}

/// Result of one non-blocking read attempt.
#[derive(Debug)]
pub(crate) enum ReadOutcome {
    /// Bytes were appended to the buffer.
    Data(usize),
    /// Nothing available yet.
    WouldBlock,
    /// The connection must be torn down.
    Closed(CloseReason),
}

enum Phase {
    Reading,
    Writing { data: Vec<u8>, written: usize },
}

/// A registered connection.
pub(crate) struct Connection {
    id: u64,
    peer: SocketAddr,
    stream: TcpStream,
    buffer: Vec<u8>,
    phase: Phase,
    last_activity: Instant,
}

impl Connection {
    pub(crate) fn new(id: u64, peer: SocketAddr, stream: TcpStream, now: Instant) -> Self {
        Self {
            id,
            peer,
            stream,
            buffer: Vec::new(),
            phase: Phase::Reading,
            last_activity: now,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) fn is_writing(&self) -> bool {
        matches!(self.phase, Phase::Writing { .. })
    }

    pub(crate) fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > timeout
    }

    /// Read up to `scratch.len()` bytes into the receive buffer.
    pub(crate) fn read(&mut self, scratch: &mut [u8], max_buffer: usize, now: Instant) -> ReadOutcome {
        match self.stream.read(scratch) {
            Ok(0) => ReadOutcome::Closed(CloseReason::PeerClosed),
            Ok(n) => {
                self.last_activity = now;
                self.buffer.extend_from_slice(&scratch[..n]);
                if self.buffer.len() > max_buffer {
                    return ReadOutcome::Closed(CloseReason::BufferOverflow);
                }
                ReadOutcome::Data(n)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => ReadOutcome::WouldBlock,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => ReadOutcome::WouldBlock,
            Err(e) => ReadOutcome::Closed(CloseReason::Io(e.kind())),
        }
    }

    /// Try to decode the receive buffer. A complete command empties it.
    pub(crate) fn take_command(&mut self) -> Decoded<Command> {
        let decoded = decode(&self.buffer);
        if matches!(decoded, Decoded::Complete(_)) {
            self.buffer.clear();
        }
        decoded
    }

    pub(crate) fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Queue `data` as the response; no further reads happen on this
    /// connection.
    pub(crate) fn respond(&mut self, data: Vec<u8>) {
        self.buffer.clear();
        self.phase = Phase::Writing { data, written: 0 };
    }

    /// Write as much of the pending response as the socket takes.
    ///
    /// Returns `Ok(true)` once everything is written.
    pub(crate) fn flush(&mut self, now: Instant) -> Result<bool, CloseReason> {
        let Phase::Writing { data, written } = &mut self.phase else {
            return Ok(false);
        };
        while *written < data.len() {
            match self.stream.write(&data[*written..]) {
                Ok(0) => return Err(CloseReason::Io(io::ErrorKind::WriteZero)),
                Ok(n) => {
                    *written += n;
                    self.last_activity = now;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(CloseReason::Io(e.kind())),
            }
        }
        Ok(true)
    }

    /// Shut the socket down and drop it.
    pub(crate) fn close(self, reason: &CloseReason) {
        let how = if *reason == CloseReason::Responded {
            Shutdown::Write
        } else {
            Shutdown::Both
        };
        let _ = self.stream.shutdown(how);
        tracing::debug!(
            conn_id = self.id,
            peer = %self.peer,
            reason = %reason,
            buffered = self.buffer.len(),
            "connection closed"
        );
    }
}
