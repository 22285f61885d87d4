//! The blocking socket round trip.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use macrogate_protocol::{decode, decode_complete, Decoded, Response};

use crate::error::ClientError;

/// Limits for one round trip.
#[derive(Debug, Clone)]
pub(crate) struct RoundTrip<'a> {
    pub host: &'a str,
    pub port: u16,
    pub timeout: Duration,
    pub max_response_size: usize,
    pub read_chunk_size: usize,
}

impl RoundTrip<'_> {
    /// Connect, send `request`, and read one response.
    ///
    /// Reading stops at EOF, at the first complete JSON response, when the
    /// size cap is exceeded, or when the deadline passes.
    pub fn run(&self, request: &[u8]) -> Result<Response, ClientError> {
        let deadline = Instant::now() + self.timeout;
        let mut stream = self.connect(deadline)?;

        stream.set_write_timeout(Some(self.remaining(deadline)?))?;
        stream.write_all(request).map_err(|e| self.io_error(e))?;
        tracing::trace!(bytes = request.len(), "request sent");

        let mut buf = Vec::new();
        let mut chunk = vec![0u8; self.read_chunk_size.max(1)];
        let mut scanner = ObjectScanner::default();
        loop {
            stream.set_read_timeout(Some(self.remaining(deadline)?))?;
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    if buf.len() > self.max_response_size {
                        return Err(ClientError::ResponseTooLarge {
                            max: self.max_response_size,
                        });
                    }
                    if !scanner.feed(&chunk[..n]) {
                        continue;
                    }
                    if let Decoded::Complete(response) = decode::<Response>(&buf) {
                        tracing::trace!(bytes = buf.len(), "response complete");
                        return Ok(response);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.io_error(e)),
            }
        }

        if buf.iter().all(u8::is_ascii_whitespace) {
            return Err(ClientError::EmptyResponse);
        }
        Ok(decode_complete(&buf, self.max_response_size)?)
    }

    fn connect(&self, deadline: Instant) -> Result<TcpStream, ClientError> {
        let addr = format!("{}:{}", self.host, self.port);
        let connect_err = |source| ClientError::Connect {
            addr: addr.clone(),
            source,
        };

        let candidates = (self.host, self.port).to_socket_addrs().map_err(connect_err)?;
        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no addresses resolved");
        for candidate in candidates {
            let remaining = self.remaining(deadline)?;
            match TcpStream::connect_timeout(&candidate, remaining) {
                Ok(stream) => {
                    tracing::debug!(addr = %candidate, "connected to gateway");
                    return Ok(stream);
                }
                Err(e) => last_err = e,
            }
        }
        Err(connect_err(last_err))
    }

    fn remaining(&self, deadline: Instant) -> Result<Duration, ClientError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(self.timed_out());
        }
        Ok(remaining)
    }

    fn io_error(&self, e: io::Error) -> ClientError {
        match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => self.timed_out(),
            _ => ClientError::Io(e),
        }
    }

    fn timed_out(&self) -> ClientError {
        ClientError::Timeout {
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }
}

/// Tracks brace depth outside strings so the buffer is parsed only once a
/// top-level object has closed.
#[derive(Debug, Default)]
struct ObjectScanner {
    depth: usize,
    in_string: bool,
    escaped: bool,
    closed: bool,
}

impl ObjectScanner {
    /// Consume more bytes; `true` once the outermost object has closed.
    fn feed(&mut self, bytes: &[u8]) -> bool {
        for &b in bytes {
            if self.closed {
                break;
            }
            if self.in_string {
                match b {
                    _ if self.escaped => self.escaped = false,
                    b'\\' => self.escaped = true,
                    b'"' => self.in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        self.closed = true;
                    }
                }
                _ => {}
            }
        }
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{SocketAddr, TcpListener};
    use std::thread::JoinHandle;

    /// A one-shot fake gateway that reads the request and runs `reply`.
    fn fake_gateway<F>(reply: F) -> (SocketAddr, JoinHandle<Vec<u8>>)
    where
        F: FnOnce(&mut TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = vec![0u8; 4096];
            let n = stream.read(&mut request).unwrap();
            request.truncate(n);
            reply(&mut stream);
            request
        });
        (addr, handle)
    }

    fn trip(addr: SocketAddr, timeout: Duration) -> RoundTrip<'static> {
        RoundTrip {
            host: "127.0.0.1",
            port: addr.port(),
            timeout,
            max_response_size: 1024,
            read_chunk_size: 16,
        }
    }

    #[test]
    fn reads_until_eof() {
        let (addr, server) = fake_gateway(|s| {
            s.write_all(br#"{"result":"success","report":"ok"}"#).unwrap();
        });
        let response = trip(addr, Duration::from_secs(5)).run(br#"{"type":"get_report"}"#).unwrap();
        assert!(response.is_success());
        assert_eq!(response.field("report").unwrap(), "ok");
        assert_eq!(server.join().unwrap(), br#"{"type":"get_report"}"#);
    }

    #[test]
    fn complete_response_returns_without_eof() {
        let (addr, server) = fake_gateway(|s| {
            s.write_all(br#"{"result":"success"}"#).unwrap();
            std::thread::sleep(Duration::from_secs(2));
        });
        let started = Instant::now();
        let response = trip(addr, Duration::from_secs(5)).run(b"{}").unwrap();
        assert!(response.is_success());
        assert!(started.elapsed() < Duration::from_secs(2));
        server.join().unwrap();
    }

    #[test]
    fn scanner_ignores_braces_inside_strings() {
        let mut scanner = ObjectScanner::default();
        assert!(!scanner.feed(br#"{"result":"success","message":"a } \" { ]"#));
        assert!(!scanner.feed(br#","nested":{"list":[1,{"x":"}"}]}"#));
        assert!(scanner.feed(b"}"));
    }

    #[test]
    fn large_response_is_read_in_linear_time() {
        let blob = "z".repeat(9 * 1024 * 1024);
        let body = format!(r#"{{"result":"success","blob":"{blob}"}}"#);
        let (addr, server) = fake_gateway(move |s| {
            s.write_all(body.as_bytes()).unwrap();
            std::thread::sleep(Duration::from_secs(1));
        });
        let trip = RoundTrip {
            host: "127.0.0.1",
            port: addr.port(),
            timeout: Duration::from_secs(20),
            max_response_size: 10 * 1024 * 1024,
            read_chunk_size: 8 * 1024,
        };
        let started = Instant::now();
        let response = trip.run(b"{}").unwrap();
        assert!(response.is_success());
        assert_eq!(response.field("blob").and_then(|v| v.as_str()).map(str::len), Some(blob.len()));
        assert!(started.elapsed() < Duration::from_secs(10), "{:?}", started.elapsed());
        server.join().unwrap();
    }

    #[test]
    fn silent_gateway_times_out() {
        let (addr, server) = fake_gateway(|_| std::thread::sleep(Duration::from_millis(500)));
        let err = trip(addr, Duration::from_millis(100)).run(b"{}").unwrap_err();
        assert!(err.is_timeout(), "{err}");
        server.join().unwrap();
    }

    #[test]
    fn oversized_response_is_refused() {
        let (addr, server) = fake_gateway(|s| {
            let big = format!(r#"{{"result":"success","blob":"{}"}}"#, "z".repeat(4096));
            let _ = s.write_all(big.as_bytes());
        });
        let err = trip(addr, Duration::from_secs(5)).run(b"{}").unwrap_err();
        assert!(matches!(err, ClientError::ResponseTooLarge { max: 1024 }), "{err}");
        server.join().unwrap();
    }

    #[test]
    fn hangup_without_reply_is_empty_response() {
        let (addr, server) = fake_gateway(|_| {});
        let err = trip(addr, Duration::from_secs(5)).run(b"{}").unwrap_err();
        assert!(matches!(err, ClientError::EmptyResponse), "{err}");
        server.join().unwrap();
    }

    #[test]
    fn truncated_reply_is_protocol_error() {
        let (addr, server) = fake_gateway(|s| {
            s.write_all(br#"{"result":"succ"#).unwrap();
        });
        let err = trip(addr, Duration::from_secs(5)).run(b"{}").unwrap_err();
        assert_eq!(err.code(), "PROTOCOL_ERROR", "{err}");
        server.join().unwrap();
    }

    #[test]
    fn refused_connection_is_connect_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let err = trip(addr, Duration::from_secs(1)).run(b"{}").unwrap_err();
        assert!(matches!(err, ClientError::Connect { .. }), "{err}");
    }
}
