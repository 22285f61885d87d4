//! Connection manager settings.

use std::time::Duration;

/// Default TCP port the gateway listens on.
pub const DEFAULT_PORT: u16 = 9876;

/// Settings for [`ServerState`](crate::ServerState).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind; 0 picks an ephemeral port.
    pub port: u16,
    /// Connections beyond this many are accepted and immediately closed.
    pub max_connections: usize,
    /// A connection with no successful read (or write progress) for this
    /// long is torn down.
    pub idle_timeout: Duration,
    /// Bytes requested per non-blocking read.
    pub read_chunk_size: usize,
    /// A receive buffer growing past this many bytes closes the connection.
    pub max_buffer_size: usize,
    /// How often [`ServerState::serve`](crate::ServerState::serve) ticks.
    pub tick_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: DEFAULT_PORT,
            max_connections: 5,
            idle_timeout: Duration::from_secs(30),
            read_chunk_size: 32 * 1024,   // 32 KB
            max_buffer_size: 1024 * 1024, // 1 MB
            tick_interval: Duration::from_millis(50),
        }
    }
}

impl ServerConfig {
    /// `host:port`, as used for binding and in log lines.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_wire_contract() {
        let config = ServerConfig::default();
        assert_eq!(config.address(), "localhost:9876");
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.read_chunk_size, 32768);
        assert_eq!(config.max_buffer_size, 1_048_576);
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
    }
}
