#![warn(missing_docs)]

//! # macrogate-client
//!
//! Request/response calls to a macrogate gateway.
//!
//! Every call opens a fresh connection, writes one encoded [`Command`] and
//! reads one [`Response`]. There is no pooling: the gateway closes each
//! connection after answering.
//!
//! [`GatewayClient::call`] runs the blocking round trip on tokio's blocking
//! pool, so it never stalls the caller's scheduler.
//! [`GatewayClient::call_blocking`] works from plain threads and from inside
//! a runtime.

mod error;
mod transport;

use std::time::Duration;

use macrogate_protocol::{Command, Response, DEFAULT_MAX_RESPONSE_SIZE};
use serde_json::{Map, Value};
use tokio::runtime::{Handle, RuntimeFlavor};

pub use error::ClientError;

use transport::RoundTrip;

/// Commands that run scripts and get the longer timeout.
const CODE_COMMANDS: &[&str] = &["execute_code", "run_macro"];

/// Client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway host.
    pub host: String,
    /// Gateway port.
    pub port: u16,
    /// End-to-end budget for ordinary commands.
    pub timeout: Duration,
    /// End-to-end budget for `execute_code` and `run_macro`.
    pub code_timeout: Duration,
    /// Largest response accepted.
    pub max_response_size: usize,
    /// Bytes requested per read.
    pub read_chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 9876,
            timeout: Duration::from_secs(30),
            code_timeout: Duration::from_secs(60),
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            read_chunk_size: 8 * 1024,
        }
    }
}

/// A handle for calling one gateway.
#[derive(Debug, Clone, Default)]
pub struct GatewayClient {
    config: ClientConfig,
}

impl GatewayClient {
    /// A client using `config`.
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// The client's settings.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The round-trip budget for a command type.
    pub fn timeout_for(&self, kind: &str) -> Duration {
        if CODE_COMMANDS.contains(&kind) {
            self.config.code_timeout
        } else {
            self.config.timeout
        }
    }

    /// Send `command` on the calling thread.
    pub fn send(&self, command: &Command) -> Result<Response, ClientError> {
        let request = command.encode()?;
        let trip = RoundTrip {
            host: &self.config.host,
            port: self.config.port,
            timeout: self.timeout_for(&command.kind),
            max_response_size: self.config.max_response_size,
            read_chunk_size: self.config.read_chunk_size,
        };
        tracing::debug!(command = %command.kind, port = self.config.port, "calling gateway");
        let result = trip.run(&request);
        if let Err(e) = &result {
            tracing::warn!(command = %command.kind, error = %e, "gateway call failed");
        }
        result
    }

    /// Send `command` from async code.
    pub async fn call(&self, command: Command) -> Result<Response, ClientError> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.send(&command))
            .await
            .map_err(|e| ClientError::Worker(e.to_string()))?
    }

    /// Send `command` from synchronous code, whatever the caller's context.
    ///
    /// Outside a runtime the round trip runs inline. Inside a multi-thread
    /// runtime it runs under `block_in_place` so other tasks move off this
    /// worker. Inside a current-thread runtime it runs on a helper thread.
    pub fn call_blocking(&self, command: &Command) -> Result<Response, ClientError> {
        let Ok(handle) = Handle::try_current() else {
            return self.send(command);
        };
        match handle.runtime_flavor() {
            RuntimeFlavor::MultiThread => tokio::task::block_in_place(|| self.send(command)),
            _ => std::thread::scope(|scope| {
                scope
                    .spawn(|| self.send(command))
                    .join()
                    .map_err(|_| ClientError::Worker("client thread panicked".into()))?
            }),
        }
    }

    /// Run `code` in the gateway sandbox.
    pub async fn execute_code(&self, code: &str) -> Result<Response, ClientError> {
        self.call(Command::new("execute_code").with_param("code", code))
            .await
    }

    /// Check `code` against the gateway's policy without running it.
    pub async fn validate_code(&self, code: &str) -> Result<Response, ClientError> {
        self.call(Command::new("validate_macro_code").with_param("code", code))
            .await
    }

    /// Run a macro file with injected parameters.
    pub async fn run_macro(
        &self,
        macro_path: &str,
        params: Map<String, Value>,
    ) -> Result<Response, ClientError> {
        self.call(
            Command::new("run_macro")
                .with_param("macro_path", macro_path)
                .with_param("params", Value::Object(params)),
        )
        .await
    }

    /// Create or replace a macro file in the gateway's macro directory.
    pub async fn update_macro(&self, macro_name: &str, code: &str) -> Result<Response, ClientError> {
        self.call(
            Command::new("update_macro")
                .with_param("macro_name", macro_name)
                .with_param("code", code),
        )
        .await
    }

    /// Fetch the gateway's recent log lines.
    pub async fn get_report(&self) -> Result<Response, ClientError> {
        self.call(Command::new("get_report")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_wire_contract() {
        let config = ClientConfig::default();
        assert_eq!(config.port, 9876);
        assert_eq!(config.max_response_size, 10 * 1024 * 1024);
        assert_eq!(config.read_chunk_size, 8192);
    }

    #[test]
    fn code_commands_get_longer_timeout() {
        let client = GatewayClient::default();
        assert_eq!(client.timeout_for("execute_code"), Duration::from_secs(60));
        assert_eq!(client.timeout_for("run_macro"), Duration::from_secs(60));
        assert_eq!(client.timeout_for("get_report"), Duration::from_secs(30));
    }
}
