//! Resource limits of the connection manager, over real loopback sockets.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use macrogate_protocol::{Command, Response};
use macrogate_server::{RequestHandler, ServerConfig, ServerState, TickStats};

fn ok(_: Command) -> Response {
    Response::success()
}

fn config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..ServerConfig::default()
    }
}

/// Tick until `done` holds, summing the stats. Panics after five seconds.
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

/// Whether the peer has closed `stream` (EOF or reset).
fn peer_closed(stream: &mut TcpStream) -> bool {
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut buf = [0u8; 64];
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return true,
            Ok(_) => continue,
        }
    }
}

#[test]
fn connection_beyond_limit_is_closed_without_registering() {
    let mut state = ServerState::start(
        ServerConfig {
            max_connections: 2,
            ..config()
        },
        ok,
    )
    .unwrap();
    let addr = state.local_addr();

    let _a = TcpStream::connect(addr).unwrap();
    let _b = TcpStream::connect(addr).unwrap();
    tick_until(&mut state, |s, _| s.active_connections() == 2);

    let mut c = TcpStream::connect(addr).unwrap();
    let stats = tick_until(&mut state, |_, t| t.rejected == 1);
    assert_eq!(stats.accepted, 0);
    assert_eq!(state.active_connections(), 2);
    assert!(peer_closed(&mut c));

    for _ in 0..10 {
        state.tick();
        assert!(state.active_connections() <= 2);
    }
}

#[test]
fn slot_frees_up_after_a_connection_closes() {
    let mut state = ServerState::start(
        ServerConfig {
            max_connections: 1,
            ..config()
        },
        ok,
    )
    .unwrap();
    let addr = state.local_addr();

    let mut first = TcpStream::connect(addr).unwrap();
    first.write_all(br#"{"type":"ping"}"#).unwrap();
    tick_until(&mut state, |_, t| t.closed == 1);
    let mut reply = String::new();
    first.read_to_string(&mut reply).unwrap();
    assert!(reply.contains("success"));

    let mut second = TcpStream::connect(addr).unwrap();
    second.write_all(br#"{"type":"ping"}"#).unwrap();
    let stats = tick_until(&mut state, |_, t| t.closed == 1);
    assert_eq!(stats.rejected, 0);
    assert_eq!(stats.dispatched, 1);
}

#[test]
fn oversized_incomplete_message_closes_connection() {
    let mut state = ServerState::start(
        ServerConfig {
            max_buffer_size: 1024,
            read_chunk_size: 256,
            ..config()
        },
        ok,
    )
    .unwrap();

    let mut client = TcpStream::connect(state.local_addr()).unwrap();
    let mut payload = br#"{"type":"execute_code","params":{"code":""#.to_vec();
    payload.extend(std::iter::repeat(b'x').take(4096));
    client.write_all(&payload).unwrap();

    let stats = tick_until(&mut state, |s, t| t.closed == 1 && s.active_connections() == 0);
    assert_eq!(stats.dispatched, 0);
    assert!(peer_closed(&mut client));
}

#[test]
fn message_at_buffer_limit_is_still_served() {
    let mut state = ServerState::start(
        ServerConfig {
            max_buffer_size: 512,
            read_chunk_size: 64,
            ..config()
        },
        ok,
    )
    .unwrap();

    let mut client = TcpStream::connect(state.local_addr()).unwrap();
    let filler = "y".repeat(400);
    let request = format!(r#"{{"type":"ping","params":{{"pad":"{filler}"}}}}"#);
    assert!(request.len() <= 512);
    client.write_all(request.as_bytes()).unwrap();

    let stats = tick_until(&mut state, |_, t| t.closed == 1);
    assert_eq!(stats.dispatched, 1);
}

#[test]
fn idle_connection_is_torn_down() {
    let mut state = ServerState::start(
        ServerConfig {
            idle_timeout: Duration::from_millis(100),
            ..config()
        },
        ok,
    )
    .unwrap();

    let mut client = TcpStream::connect(state.local_addr()).unwrap();
    tick_until(&mut state, |s, _| s.active_connections() == 1);

    let started = Instant::now();
    let stats = tick_until(&mut state, |s, _| s.active_connections() == 0);
    assert_eq!(stats.closed, 1);
    assert!(started.elapsed() >= Duration::from_millis(90));
    assert!(peer_closed(&mut client));
}

#[test]
fn stalled_partial_message_times_out() {
    let mut state = ServerState::start(
        ServerConfig {
            idle_timeout: Duration::from_millis(100),
            ..config()
        },
        ok,
    )
    .unwrap();

    let mut client = TcpStream::connect(state.local_addr()).unwrap();
    client.write_all(br#"{"type":"#).unwrap();
    tick_until(&mut state, |s, _| s.active_connections() == 1);

    let stats = tick_until(&mut state, |s, _| s.active_connections() == 0);
    assert_eq!(stats.dispatched, 0);
    assert!(peer_closed(&mut client));
}

#[test]
fn peer_hangup_is_cleaned_up() {
    let mut state = ServerState::start(config(), ok).unwrap();
    let client = TcpStream::connect(state.local_addr()).unwrap();
    tick_until(&mut state, |s, _| s.active_connections() == 1);

    drop(client);
    let stats = tick_until(&mut state, |s, _| s.active_connections() == 0);
    assert_eq!(stats.closed, 1);
    assert_eq!(stats.dispatched, 0);
}

#[test]
fn one_connection_failing_does_not_affect_another() {
    let mut state = ServerState::start(config(), ok).unwrap();
    let addr = state.local_addr();

    let mut garbage = TcpStream::connect(addr).unwrap();
    let mut good = TcpStream::connect(addr).unwrap();
    garbage.write_all(b"not json at all").unwrap();
    good.write_all(br#"{"type":"ping"}"#).unwrap();

    let stats = tick_until(&mut state, |_, t| t.closed == 2);
    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.dispatched, 1);

    let mut reply = String::new();
    garbage.read_to_string(&mut reply).unwrap();
    assert!(reply.contains("Malformed request"), "{reply}");

    let mut reply = String::new();
    good.read_to_string(&mut reply).unwrap();
    assert!(reply.contains("\"success\""), "{reply}");
}
