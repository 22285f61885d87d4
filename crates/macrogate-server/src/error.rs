//! Error types for the gateway server.

use thiserror::Error;

/// Errors starting or running the connection manager.
///
/// Per-connection failures never surface here; they close the offending
/// connection and are logged.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
    /// The listening socket could not be created.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that was requested.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure on the listener.
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}
