#![warn(missing_docs)]

//! # macrogate-protocol
//!
//! Wire codec for the macrogate gateway.
//!
//! Every message is a single UTF-8 JSON object with no length prefix and no
//! delimiter. A request looks like `{"type": "...", "params": {...}}`; a
//! response carries `"result": "success" | "error"`, an optional `message`
//! and `traceback`, and any command-specific fields alongside.
//!
//! Because there is no framing, a receiver cannot tell from the byte count
//! whether a message is complete. [`decode`] therefore answers with a
//! [`Decoded`] value that separates "keep reading" from "this will never
//! parse".

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use serde_json::{Map, Value};
use thiserror::Error;

/// Default cap on a response accepted by a client: 10 MiB.
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

/// Errors produced by the codec.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// The payload exceeded the configured size limit.
    #[error("message too large: {size} bytes (limit: {max} bytes)")]
    TooLarge {
        /// Observed payload size in bytes.
        size: usize,
        /// Configured limit in bytes.
        max: usize,
    },

    /// The input ended before a complete message was received.
    #[error("incomplete message: input ended before the JSON object was closed")]
    Incomplete,

    /// The input can never become a valid message.
    #[error("malformed message: {0}")]
    Malformed(String),
}

impl ProtocolError {
    /// Returns a static error code string for programmatic matching.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Encode(_) => "ENCODE",
            Self::TooLarge { .. } => "TOO_LARGE",
            Self::Incomplete => "INCOMPLETE",
            Self::Malformed(_) => "MALFORMED",
        }
    }
}

/// A request: a type tag plus a parameter mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// The command's type tag, matched exactly by the dispatcher.
    #[serde(rename = "type")]
    pub kind: String,

    /// Named parameters. Absent on the wire means empty.
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Command {
    /// Create a command with no parameters.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: Map::new(),
        }
    }

    /// Add a parameter, replacing any previous value under the same name.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self)
    }
}

/// Outcome tag carried in every response's `result` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The command completed.
    Success,
    /// The command failed; `message` says why.
    Error,
}

/// A response to one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// `success` or `error`.
    pub result: Status,

    /// Human-readable summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Diagnostic trace for failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,

    /// Command-specific payload fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Response {
    /// A bare success response.
    pub fn success() -> Self {
        Self {
            result: Status::Success,
            message: None,
            traceback: None,
            fields: Map::new(),
        }
    }

    /// An error response with a message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            result: Status::Error,
            message: Some(message.into()),
            traceback: None,
            fields: Map::new(),
        }
    }

    /// Build a response from a flat JSON object such as a handler payload.
    ///
    /// A missing `result` key is treated as success, so handlers may return
    /// just their payload fields.
    pub fn from_fields(mut fields: Map<String, Value>) -> Result<Self, ProtocolError> {
        fields
            .entry("result")
            .or_insert_with(|| Value::String("success".into()));
        serde_json::from_value(Value::Object(fields))
            .map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Set the message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Set the traceback.
    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }

    /// Add a payload field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Whether `result` is `success`.
    pub fn is_success(&self) -> bool {
        self.result == Status::Success
    }

    /// Look up a payload field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self)
    }
}

/// Result of attempting to decode a receive buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    /// The buffer held exactly one complete message.
    Complete(T),
    /// The buffer is a prefix of a message; keep the bytes and read more.
    Incomplete,
    /// The buffer can never become a valid message.
    Malformed(String),
}

impl<T> Decoded<T> {
    /// Whether more bytes are needed.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete)
    }

    /// Convert into a `Result`, mapping non-complete outcomes to errors.
    pub fn into_result(self) -> Result<T, ProtocolError> {
        match self {
            Self::Complete(value) => Ok(value),
            Self::Incomplete => Err(ProtocolError::Incomplete),
            Self::Malformed(reason) => Err(ProtocolError::Malformed(reason)),
        }
    }
}

/// Serialize a message into one contiguous byte sequence.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(message)?)
}

/// Try to decode `buf` as exactly one JSON object of type `T`.
///
/// An empty or all-whitespace buffer, or one cut off mid-document, is
/// [`Decoded::Incomplete`]. Anything that fails for another reason (bad
/// syntax, a non-object top level, a missing field, trailing bytes after the
/// object) is [`Decoded::Malformed`].
pub fn decode<T: DeserializeOwned>(buf: &[u8]) -> Decoded<T> {
    let Some(start) = buf.iter().position(|b| !b.is_ascii_whitespace()) else {
        return Decoded::Incomplete;
    };
    if buf[start] != b'{' {
        return Decoded::Malformed(format!(
            "expected a JSON object, found byte 0x{:02x} at offset {}",
            buf[start], start
        ));
    }

    match serde_json::from_slice::<T>(buf) {
        Ok(value) => Decoded::Complete(value),
        Err(e) if e.classify() == Category::Eof => Decoded::Incomplete,
        Err(e) => Decoded::Malformed(e.to_string()),
    }
}

/// Decode a finished payload, enforcing a size limit first.
///
/// Used once all bytes have arrived (peer closed, or the caller otherwise
/// knows nothing more is coming), so an incomplete buffer is an error.
pub fn decode_complete<T: DeserializeOwned>(buf: &[u8], max_size: usize) -> Result<T, ProtocolError> {
    if buf.len() > max_size {
        return Err(ProtocolError::TooLarge {
            size: buf.len(),
            max: max_size,
        });
    }
    decode(buf).into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_roundtrip_with_nested_params() {
        let cmd = Command::new("create_body")
            .with_param("name", "Bracket")
            .with_param("dims", json!({"x": 10, "y": [1, 2, {"z": null}], "ok": true}))
            .with_param("scale", 0.5);

        let bytes = cmd.encode().unwrap();
        match decode::<Command>(&bytes) {
            Decoded::Complete(decoded) => assert_eq!(decoded, cmd),
            other => panic!("expected complete decode, got {other:?}"),
        }
    }

    #[test]
    fn command_wire_shape_uses_type_key() {
        let bytes = Command::new("get_report").encode().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"type": "get_report", "params": {}}));
    }

    #[test]
    fn command_params_default_to_empty() {
        let decoded = decode::<Command>(br#"{"type":"get_report"}"#);
        assert_eq!(decoded, Decoded::Complete(Command::new("get_report")));
    }

    #[test]
    fn empty_and_whitespace_buffers_are_incomplete() {
        assert!(decode::<Command>(b"").is_incomplete());
        assert!(decode::<Command>(b"  \r\n\t").is_incomplete());
    }

    #[test]
    fn every_strict_prefix_is_incomplete() {
        let full = br#"{"type":"execute_code","params":{"code":"x = 1\nprint(x)","n":42,"flag":false,"nested":{"list":["a","b"]}}}"#;
        for end in 1..full.len() {
            let decoded = decode::<Command>(&full[..end]);
            assert!(
                decoded.is_incomplete(),
                "prefix of length {end} ({:?}) decoded as {decoded:?}",
                String::from_utf8_lossy(&full[..end])
            );
        }
        assert!(matches!(decode::<Command>(full), Decoded::Complete(_)));
    }

    #[test]
    fn split_multibyte_character_is_incomplete() {
        let full = r#"{"type":"echo","params":{"text":"héllo"}}"#.as_bytes();
        let cut = full.iter().position(|&b| b >= 0x80).unwrap() + 1;
        assert!(decode::<Command>(&full[..cut]).is_incomplete());
    }

    #[test]
    fn non_object_top_level_is_malformed() {
        for input in [&b"[1,2]"[..], b"\"text\"", b"42", b"GET / HTTP/1.1\r\n"] {
            let decoded = decode::<Command>(input);
            assert!(
                matches!(decoded, Decoded::Malformed(_)),
                "{:?} should be malformed, got {decoded:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn invalid_syntax_is_malformed() {
        let decoded = decode::<Command>(br#"{"type": execute_code}"#);
        assert!(matches!(decoded, Decoded::Malformed(_)));
    }

    #[test]
    fn missing_type_is_malformed() {
        let decoded = decode::<Command>(br#"{"params": {}}"#);
        match decoded {
            Decoded::Malformed(reason) => assert!(reason.contains("type"), "{reason}"),
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn wrong_param_shape_is_malformed() {
        let decoded = decode::<Command>(br#"{"type": "x", "params": [1, 2]}"#);
        assert!(matches!(decoded, Decoded::Malformed(_)));
    }

    #[test]
    fn two_concatenated_messages_are_never_split() {
        let decoded = decode::<Command>(br#"{"type":"a"}{"type":"b"}"#);
        assert!(matches!(decoded, Decoded::Malformed(_)));
    }

    #[test]
    fn trailing_whitespace_is_accepted() {
        let decoded = decode::<Command>(b"{\"type\":\"a\"}\n");
        assert!(matches!(decoded, Decoded::Complete(_)));
    }

    #[test]
    fn response_flattens_payload_fields() {
        let resp = Response::success()
            .with_message("done")
            .with_field("output", "4\n");
        let value: Value = serde_json::from_slice(&resp.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"result": "success", "message": "done", "output": "4\n"})
        );
    }

    #[test]
    fn response_error_omits_absent_fields() {
        let value: Value = serde_json::to_value(Response::error("boom")).unwrap();
        assert_eq!(value, json!({"result": "error", "message": "boom"}));
    }

    #[test]
    fn response_decodes_extra_fields() {
        let bytes = br#"{"result":"error","message":"bad","traceback":"tb","code":"X"}"#;
        let resp: Response = decode_complete(bytes, DEFAULT_MAX_RESPONSE_SIZE).unwrap();
        assert!(!resp.is_success());
        assert_eq!(resp.message.as_deref(), Some("bad"));
        assert_eq!(resp.traceback.as_deref(), Some("tb"));
        assert_eq!(resp.field("code"), Some(&json!("X")));
    }

    #[test]
    fn response_from_fields_defaults_to_success() {
        let mut fields = Map::new();
        fields.insert("volume".into(), json!(12.5));
        let resp = Response::from_fields(fields).unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.field("volume"), Some(&json!(12.5)));
    }

    #[test]
    fn response_from_fields_rejects_bad_status() {
        let mut fields = Map::new();
        fields.insert("result".into(), json!("maybe"));
        assert!(Response::from_fields(fields).is_err());
    }

    #[test]
    fn decode_complete_rejects_oversized_payload() {
        let bytes = br#"{"result":"success"}"#;
        let err = decode_complete::<Response>(bytes, 8).unwrap_err();
        assert!(matches!(err, ProtocolError::TooLarge { size: 20, max: 8 }));
        assert_eq!(err.code(), "TOO_LARGE");
    }

    #[test]
    fn decode_complete_reports_truncation() {
        let err = decode_complete::<Response>(br#"{"result":"succ"#, 1024).unwrap_err();
        assert!(matches!(err, ProtocolError::Incomplete));
    }
}
