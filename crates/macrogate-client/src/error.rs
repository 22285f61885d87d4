//! Client error types.

use std::io;

use macrogate_protocol::{ProtocolError, Response};
use thiserror::Error;

/// Errors from one gateway round trip.
///
/// These are transport and protocol failures. A gateway that answers with
/// `result: "error"` is a successful round trip and comes back as a
/// [`Response`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// No connection could be made.
    #[error("cannot connect to {addr}: {source}")]
    Connect {
        /// The address that was tried.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The round trip did not finish in time.
    #[error("no complete response within {timeout_ms}ms")]
    Timeout {
        /// The configured timeout.
        timeout_ms: u64,
    },

    /// The response outgrew the size cap.
    #[error("response exceeds {max} bytes")]
    ResponseTooLarge {
        /// The configured cap.
        max: usize,
    },

    /// The gateway closed the connection without answering.
    #[error("gateway closed the connection without a response")]
    EmptyResponse,

    /// The response bytes were not a valid response.
    #[error("invalid response: {0}")]
    Protocol(#[from] ProtocolError),

    /// A read or write failed mid-request.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The blocking worker running the round trip failed.
    #[error("client worker failed: {0}")]
    Worker(String),
}

impl ClientError {
    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "CONNECT_FAILED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::ResponseTooLarge { .. } => "RESPONSE_TOO_LARGE",
            Self::EmptyResponse => "EMPTY_RESPONSE",
            Self::Protocol(_) => "PROTOCOL_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Worker(_) => "INTERNAL",
        }
    }

    /// Whether the failure was a deadline, including a connect timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Connect { source, .. } => source.kind() == io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    /// Render as an error [`Response`], for callers that always want one.
    pub fn into_response(self) -> Response {
        Response::error(format!("Failed to connect to gateway: {self}"))
            .with_field("code", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_classification() {
        assert!(ClientError::Timeout { timeout_ms: 5 }.is_timeout());
        let connect = ClientError::Connect {
            addr: "localhost:9876".into(),
            source: io::Error::new(io::ErrorKind::TimedOut, "timed out"),
        };
        assert!(connect.is_timeout());
        let refused = ClientError::Connect {
            addr: "localhost:9876".into(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(!refused.is_timeout());
        assert!(!ClientError::EmptyResponse.is_timeout());
    }

    #[test]
    fn into_response_keeps_cause() {
        let response = ClientError::ResponseTooLarge { max: 10 }.into_response();
        assert!(!response.is_success());
        assert_eq!(
            response.message.as_deref(),
            Some("Failed to connect to gateway: response exceeds 10 bytes")
        );
        assert_eq!(response.field("code").unwrap(), "RESPONSE_TOO_LARGE");
    }
}
