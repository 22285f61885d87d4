//! Client against a real gateway ticking on a background thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use macrogate_client::{ClientConfig, ClientError, GatewayClient};
use macrogate_error::DispatchError;
use macrogate_protocol::Command;
use macrogate_server::{Dispatcher, HandlerTable, ServerConfig, ServerState};
use serde_json::{json, Map};

struct Running {
    port: u16,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Running {
    fn start() -> Self {
        let handlers = HandlerTable::new()
            .with("ping", |_| {
                let mut out = Map::new();
                out.insert("pong".into(), json!(true));
                Ok(out)
            })
            .with("fail", |_| Err(DispatchError::MissingParam("doc".into())));
        let dispatcher = Dispatcher::builder(handlers).build();
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            tick_interval: Duration::from_millis(2),
            ..ServerConfig::default()
        };
        let mut state = ServerState::start(config, dispatcher).unwrap();
        let port = state.local_addr().port();

        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let thread = std::thread::spawn(move || {
            while !flag.load(Ordering::SeqCst) {
                state.tick();
                std::thread::sleep(state.config().tick_interval);
            }
            state.stop();
        });

        Self {
            port,
            stop,
            thread: Some(thread),
        }
    }

    fn client(&self) -> GatewayClient {
        GatewayClient::new(ClientConfig {
            host: "127.0.0.1".into(),
            port: self.port,
            timeout: Duration::from_secs(10),
            code_timeout: Duration::from_secs(10),
            ..ClientConfig::default()
        })
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[test]
fn blocking_call_outside_runtime() {
    let gateway = Running::start();
    let response = gateway
        .client()
        .call_blocking(&Command::new("ping"))
        .unwrap();
    assert!(response.is_success());
    assert_eq!(response.field("pong"), Some(&json!(true)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_helpers() {
    let gateway = Running::start();
    let client = gateway.client();

    let response = client.execute_code("result = 2 + 2").await.unwrap();
    assert!(response.is_success(), "{response:?}");
    assert_eq!(response.field("value"), Some(&json!(4)));

    let response = client.execute_code("import os").await.unwrap();
    assert!(!response.is_success());
    assert!(response.message.unwrap().contains("'os'"));

    let response = client.validate_code("x = [i * i for i in range(3)]").await.unwrap();
    assert!(response.is_success());

    let response = client.get_report().await.unwrap();
    assert!(response.is_success());
    assert!(response.field("report").is_some());

    let response = client.run_macro("missing", Map::new()).await.unwrap();
    assert!(!response.is_success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_call_inside_multi_thread_runtime() {
    let gateway = Running::start();
    let response = gateway
        .client()
        .call_blocking(&Command::new("fail"))
        .unwrap();
    assert!(!response.is_success());
    assert_eq!(response.field("code"), Some(&json!("MISSING_PARAM")));
}

#[tokio::test(flavor = "current_thread")]
async fn blocking_call_inside_current_thread_runtime() {
    let gateway = Running::start();
    let response = gateway
        .client()
        .call_blocking(&Command::new("frobnicate"))
        .unwrap();
    assert_eq!(response.message.as_deref(), Some("Unknown command: frobnicate"));
}

#[test]
fn no_gateway_is_a_connect_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = GatewayClient::new(ClientConfig {
        host: "127.0.0.1".into(),
        port,
        ..ClientConfig::default()
    });
    let err = client.call_blocking(&Command::new("ping")).unwrap_err();
    assert!(matches!(err, ClientError::Connect { .. }), "{err}");
    let response = err.into_response();
    assert!(response
        .message
        .unwrap()
        .starts_with("Failed to connect to gateway: "));
}
