//! The tick-driven connection manager.
//!
//! All socket I/O, decoding and dispatch happen inside [`ServerState::tick`],
//! on whichever thread calls it. Nothing else touches the connection set.

use std::future::Future;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use macrogate_protocol::{Command, Decoded, Response};

use crate::config::ServerConfig;
use crate::connection::{CloseReason, Connection, ReadOutcome};
use crate::error::ServerError;

/// Turns one decoded command into one response.
///
/// Implementations run on the tick thread and should not block for longer
/// than the work itself takes.
pub trait RequestHandler {
    /// Handle `command`.
    fn handle(&self, command: Command) -> Response;
}

impl<F> RequestHandler for F
where
    F: Fn(Command) -> Response,
{
    fn handle(&self, command: Command) -> Response {
        self(command)
    }
}

/// What one call to [`ServerState::tick`] did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    /// Connections registered.
    pub accepted: usize,
    /// Connections accepted and immediately closed because the limit was hit.
    pub rejected: usize,
    /// Registered connections torn down.
    pub closed: usize,
    /// Commands handed to the handler.
    pub dispatched: usize,
}

impl TickStats {
    /// Whether the tick did nothing observable.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Listening socket plus every open connection.
pub struct ServerState<H> {
    config: ServerConfig,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    connections: Vec<Connection>,
    handler: H,
    scratch: Vec<u8>,
    next_id: u64,
}

impl<H: RequestHandler> ServerState<H> {
    /// Bind the listener and return a running, empty server.
    pub fn start(config: ServerConfig, handler: H) -> Result<Self, ServerError> {
        let addr = config.address();
        let listener = TcpListener::bind((config.host.as_str(), config.port)).map_err(|source| {
            ServerError::Bind {
                addr: addr.clone(),
                source,
            }
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        tracing::info!(
            addr = %local_addr,
            max_connections = config.max_connections,
            "gateway listening"
        );

        Ok(Self {
            scratch: vec![0; config.read_chunk_size.max(1)],
            config,
            listener: Some(listener),
            local_addr,
            connections: Vec::new(),
            handler,
            next_id: 0,
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of registered connections.
    pub fn active_connections(&self) -> usize {
        self.connections.len()
    }

    /// Whether the listener is still open.
    pub fn is_running(&self) -> bool {
        self.listener.is_some()
    }

    /// The handler commands are dispatched to.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// The manager's configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run one scheduling step: one accept attempt, then one pass over every
    /// connection in registration order.
    pub fn tick(&mut self) -> TickStats {
        let mut stats = TickStats::default();
        if self.listener.is_none() {
            return stats;
        }
        let now = Instant::now();

        self.accept(now, &mut stats);

        let mut i = 0;
        while i < self.connections.len() {
            match self.service(i, now, &mut stats) {
                Some(reason) => {
                    let conn = self.connections.remove(i);
                    conn.close(&reason);
                    stats.closed += 1;
                }
                None => i += 1,
            }
        }

        if !stats.is_empty() {
            tracing::trace!(?stats, active = self.connections.len(), "tick");
        }
        stats
    }

    /// Close every connection and the listener. Later ticks do nothing.
    pub fn stop(&mut self) {
        let open = self.connections.len();
        for conn in self.connections.drain(..) {
            conn.close(&CloseReason::Shutdown);
        }
        if self.listener.take().is_some() {
            tracing::info!(addr = %self.local_addr, closed = open, "gateway stopped");
        }
    }

    /// Tick every `tick_interval` until `shutdown` resolves, then stop.
    ///
    /// Each tick runs synchronously on the calling task, so a long command
    /// delays the next tick for every connection.
    pub async fn serve<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }
        self.stop();
    }

    fn accept(&mut self, now: Instant, stats: &mut TickStats) {
        let Some(listener) = &self.listener else {
            return;
        };
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                return;
            }
        };

        if self.connections.len() >= self.config.max_connections {
            let _ = stream.shutdown(Shutdown::Both);
            stats.rejected += 1;
            tracing::warn!(
                peer = %peer,
                max_connections = self.config.max_connections,
                "connection limit reached, rejecting"
            );
            return;
        }

        if let Err(e) = stream.set_nonblocking(true) {
            let _ = stream.shutdown(Shutdown::Both);
            stats.rejected += 1;
            tracing::warn!(peer = %peer, error = %e, "failed to make socket non-blocking");
            return;
        }
        let _ = stream.set_nodelay(true);

        let id = self.next_id;
        self.next_id += 1;
        self.connections.push(Connection::new(id, peer, stream, now));
        stats.accepted += 1;
        tracing::debug!(conn_id = id, peer = %peer, active = self.connections.len(), "connection accepted");
    }

    /// Advance connection `i`. Returns why it must close, if it must.
    fn service(&mut self, i: usize, now: Instant, stats: &mut TickStats) -> Option<CloseReason> {
        let conn = &mut self.connections[i];

        if conn.is_idle(now, self.config.idle_timeout) {
            tracing::info!(conn_id = conn.id(), peer = %conn.peer(), "idle timeout");
            return Some(CloseReason::Idle);
        }

        if !conn.is_writing() {
            match conn.read(&mut self.scratch, self.config.max_buffer_size, now) {
                ReadOutcome::WouldBlock => return None,
                ReadOutcome::Closed(CloseReason::BufferOverflow) => {
                    tracing::warn!(
                        conn_id = conn.id(),
                        peer = %conn.peer(),
                        bytes = conn.buffered(),
                        max = self.config.max_buffer_size,
                        "receive buffer overflow"
                    );
                    return Some(CloseReason::BufferOverflow);
                }
                ReadOutcome::Closed(reason) => return Some(reason),
                ReadOutcome::Data(n) => {
                    tracing::trace!(conn_id = conn.id(), bytes = n, "read");
                }
            }

            match conn.take_command() {
                Decoded::Incomplete => return None,
                Decoded::Malformed(reason) => {
                    tracing::warn!(conn_id = conn.id(), peer = %conn.peer(), %reason, "malformed request");
                    let response = Response::error(format!("Malformed request: {reason}"));
                    conn.respond(encode_response(&response));
                }
                Decoded::Complete(command) => {
                    stats.dispatched += 1;
                    let response = dispatch(&self.handler, command);
                    conn.respond(encode_response(&response));
                }
            }
        }

        match conn.flush(now) {
            Ok(true) => Some(CloseReason::Responded),
            Ok(false) => None,
            Err(reason) => Some(reason),
        }
    }
}

impl<H> Drop for ServerState<H> {
    fn drop(&mut self) {
        for conn in self.connections.drain(..) {
            conn.close(&CloseReason::Shutdown);
        }
    }
}

/// Run the handler, turning a panic into an error response.
fn dispatch<H: RequestHandler>(handler: &H, command: Command) -> Response {
    let kind = command.kind.clone();
    tracing::debug!(command = %kind, params = command.params.len(), "dispatching");
    match catch_unwind(AssertUnwindSafe(|| handler.handle(command))) {
        Ok(response) => response,
        Err(_) => {
            tracing::error!(command = %kind, "handler panicked");
            Response::error(format!("Internal error while handling '{kind}'"))
        }
    }
}

const ENCODE_FALLBACK: &[u8] = br#"{"result":"error","message":"Failed to encode response"}"#;

fn encode_response(response: &Response) -> Vec<u8> {
    match response.encode() {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode response");
            ENCODE_FALLBACK.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    fn echo(command: Command) -> Response {
        Response::success().with_field("echo", command.kind)
    }

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        }
    }

    fn tick_until<H: RequestHandler>(
        state: &mut ServerState<H>,
        mut done: impl FnMut(&ServerState<H>, &TickStats) -> bool,
    ) -> TickStats {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut total = TickStats::default();
        loop {
            let stats = state.tick();
            total.accepted += stats.accepted;
            total.rejected += stats.rejected;
            total.closed += stats.closed;
            total.dispatched += stats.dispatched;
            if done(state, &total) {
                return total;
            }
            assert!(Instant::now() < deadline, "condition not reached: {total:?}");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn start_binds_ephemeral_port() {
        let state = ServerState::start(test_config(), echo).unwrap();
        assert_ne!(state.local_addr().port(), 0);
        assert!(state.is_running());
        assert_eq!(state.active_connections(), 0);
    }

    #[test]
    fn bind_failure_is_reported() {
        let first = ServerState::start(test_config(), echo).unwrap();
        let config = ServerConfig {
            port: first.local_addr().port(),
            ..test_config()
        };
        let err = ServerState::start(config, echo).err().unwrap();
        assert!(matches!(err, ServerError::Bind { .. }), "{err}");
    }

    #[test]
    fn request_is_answered_then_closed() {
        let mut state = ServerState::start(test_config(), echo).unwrap();
        let mut client = TcpStream::connect(state.local_addr()).unwrap();
        client.write_all(br#"{"type":"ping","params":{}}"#).unwrap();

        let stats = tick_until(&mut state, |_, t| t.closed == 1);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.dispatched, 1);
        assert_eq!(state.active_connections(), 0);

        let mut reply = String::new();
        client.read_to_string(&mut reply).unwrap();
        let response: Response = serde_json::from_str(&reply).unwrap();
        assert!(response.is_success());
        assert_eq!(response.field("echo").unwrap(), "ping");
    }

    #[test]
    fn split_request_waits_for_remaining_bytes() {
        let mut state = ServerState::start(test_config(), echo).unwrap();
        let mut client = TcpStream::connect(state.local_addr()).unwrap();
        client.write_all(br#"{"type":"pi"#).unwrap();
        tick_until(&mut state, |s, _| s.active_connections() == 1);
        for _ in 0..5 {
            assert_eq!(state.tick().dispatched, 0);
        }

        client.write_all(br#"ng"}"#).unwrap();
        let stats = tick_until(&mut state, |_, t| t.closed == 1);
        assert_eq!(stats.dispatched, 1);
    }

    #[test]
    fn malformed_request_gets_error_and_close() {
        let mut state = ServerState::start(test_config(), echo).unwrap();
        let mut client = TcpStream::connect(state.local_addr()).unwrap();
        client.write_all(b"{\"type\": 42}").unwrap();

        let stats = tick_until(&mut state, |_, t| t.closed == 1);
        assert_eq!(stats.dispatched, 0);

        let mut reply = String::new();
        client.read_to_string(&mut reply).unwrap();
        let response: Response = serde_json::from_str(&reply).unwrap();
        assert!(!response.is_success());
        assert!(response
            .message
            .unwrap()
            .starts_with("Malformed request: "));
    }

    #[test]
    fn panicking_handler_does_not_stop_the_loop() {
        let handler = |command: Command| -> Response {
            if command.kind == "boom" {
                panic!("handler blew up");
            }
            Response::success()
        };
        let mut state = ServerState::start(test_config(), handler).unwrap();

        let mut bad = TcpStream::connect(state.local_addr()).unwrap();
        bad.write_all(br#"{"type":"boom"}"#).unwrap();
        tick_until(&mut state, |_, t| t.closed == 1);
        let mut reply = String::new();
        bad.read_to_string(&mut reply).unwrap();
        assert!(reply.contains("Internal error while handling 'boom'"), "{reply}");

        let mut good = TcpStream::connect(state.local_addr()).unwrap();
        good.write_all(br#"{"type":"ok"}"#).unwrap();
        tick_until(&mut state, |_, t| t.closed == 1);
        let mut reply = String::new();
        good.read_to_string(&mut reply).unwrap();
        assert!(reply.contains("\"success\""), "{reply}");
    }

    #[test]
    fn stop_closes_everything() {
        let mut state = ServerState::start(test_config(), echo).unwrap();
        let mut client = TcpStream::connect(state.local_addr()).unwrap();
        tick_until(&mut state, |s, _| s.active_connections() == 1);

        state.stop();
        assert!(!state.is_running());
        assert_eq!(state.active_connections(), 0);
        assert!(state.tick().is_empty());

        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut buf = [0u8; 16];
        assert!(matches!(client.read(&mut buf), Ok(0) | Err(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn serve_ticks_until_shutdown() {
        let config = ServerConfig {
            tick_interval: Duration::from_millis(5),
            ..test_config()
        };
        let mut state = ServerState::start(config, echo).unwrap();
        let addr = state.local_addr();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let server = tokio::spawn(async move {
            state.serve(async {
                let _ = rx.await;
            })
            .await;
            state
        });

        let reply = tokio::task::spawn_blocking(move || {
            let mut client = TcpStream::connect(addr).unwrap();
            client.write_all(br#"{"type":"ping"}"#).unwrap();
            let mut reply = String::new();
            client.read_to_string(&mut reply).unwrap();
            reply
        })
        .await
        .unwrap();
        assert!(reply.contains("ping"), "{reply}");

        tx.send(()).unwrap();
        let state = server.await.unwrap();
        assert!(!state.is_running());
    }
}
