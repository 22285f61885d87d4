#![warn(missing_docs)]

//! Typed error types for the macrogate command dispatcher.
//!
//! Provides [`DispatchError`], the canonical error type returned by command
//! handlers, the dispatcher, and the host bridge that sandboxed scripts use
//! to reach the handler table.

use serde_json::{Map, Value};
use thiserror::Error;

/// Canonical error type for dispatcher and handler operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DispatchError {
    /// No handler is registered for the command's type tag.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// A required parameter was not supplied.
    #[error("missing required parameter '{0}'")]
    MissingParam(String),

    /// A parameter was supplied with an unusable value.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam {
        /// The parameter name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A handler reported a failure.
    #[error("{message}")]
    Handler {
        /// The command whose handler failed.
        command: String,
        /// The failure message.
        message: String,
    },

    /// A handler panicked while running.
    #[error("handler for '{command}' panicked: {message}")]
    Panicked {
        /// The command whose handler panicked.
        command: String,
        /// The panic payload, when it was a string.
        message: String,
    },

    /// A host call was attempted while another host call for the same
    /// command was still on the stack.
    #[error("re-entrant host call to '{0}' rejected")]
    Reentrant(String),

    /// An internal error (catch-all for unexpected failures).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl DispatchError {
    /// Returns a static error code string for programmatic matching.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownCommand(_) => "UNKNOWN_COMMAND",
            Self::MissingParam(_) => "MISSING_PARAM",
            Self::InvalidParam { .. } => "INVALID_PARAM",
            Self::Handler { .. } => "HANDLER_ERROR",
            Self::Panicked { .. } => "HANDLER_PANIC",
            Self::Reentrant(_) => "REENTRANT_CALL",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the failure was caused by the request rather than the host.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownCommand(_)
                | Self::MissingParam(_)
                | Self::InvalidParam { .. }
                | Self::Reentrant(_)
        )
    }

    /// Convert to the wire error payload.
    ///
    /// Returns a JSON object with `result: "error"`, `message` and `code`,
    /// plus `suggested_fix` when `known_commands` contains a close match for
    /// an unknown command name.
    pub fn to_error_fields(&self, known_commands: Option<&[&str]>) -> Map<String, Value> {
        let suggested_fix = match self {
            Self::UnknownCommand(name) => {
                known_commands.and_then(|known| find_similar_command(name, known))
            }
            Self::MissingParam(name) => Some(format!("Supply the '{name}' parameter")),
            _ => None,
        };

        let mut fields = Map::new();
        fields.insert("result".into(), Value::String("error".into()));
        fields.insert("message".into(), Value::String(self.to_string()));
        fields.insert("code".into(), Value::String(self.code().into()));
        if let Some(fix) = suggested_fix {
            fields.insert("suggested_fix".into(), Value::String(fix));
        }
        fields
    }
}

/// Find the closest registered command name using Levenshtein distance.
///
/// Returns a suggestion string if a command within edit distance 3 is found.
fn find_similar_command(name: &str, known_commands: &[&str]) -> Option<String> {
    let mut best: Option<(usize, &str)> = None;

    for &candidate in known_commands {
        let dist = strsim::levenshtein(name, candidate);
        if dist <= 3 && best.is_none_or(|(d, _)| dist < d) {
            best = Some((dist, candidate));
        }
    }

    best.map(|(_, command)| format!("Did you mean '{command}'?"))
}

// Compile-time assertion: DispatchError must be Send + Sync + 'static
const _: fn() = || {
    fn assert_bounds<T: Send + Sync + 'static>() {}
    assert_bounds::<DispatchError>();
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unknown_command() {
        let err = DispatchError::UnknownCommand("frobnicate".into());
        assert_eq!(err.to_string(), "Unknown command: frobnicate");
    }

    #[test]
    fn display_missing_param() {
        let err = DispatchError::MissingParam("code".into());
        assert_eq!(err.to_string(), "missing required parameter 'code'");
    }

    #[test]
    fn display_invalid_param() {
        let err = DispatchError::InvalidParam {
            name: "radius".into(),
            reason: "expected a number".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid parameter 'radius': expected a number"
        );
    }

    #[test]
    fn display_handler_is_bare_message() {
        let err = DispatchError::Handler {
            command: "create_body".into(),
            message: "No active document".into(),
        };
        assert_eq!(err.to_string(), "No active document");
    }

    #[test]
    fn display_internal_is_transparent() {
        let err = DispatchError::Internal(anyhow::anyhow!("root cause"));
        assert_eq!(err.to_string(), "root cause");
    }

    #[test]
    fn code_exhaustive() {
        let cases: Vec<(DispatchError, &str)> = vec![
            (DispatchError::UnknownCommand("x".into()), "UNKNOWN_COMMAND"),
            (DispatchError::MissingParam("x".into()), "MISSING_PARAM"),
            (
                DispatchError::InvalidParam {
                    name: "n".into(),
                    reason: "r".into(),
                },
                "INVALID_PARAM",
            ),
            (
                DispatchError::Handler {
                    command: "c".into(),
                    message: "m".into(),
                },
                "HANDLER_ERROR",
            ),
            (
                DispatchError::Panicked {
                    command: "c".into(),
                    message: "m".into(),
                },
                "HANDLER_PANIC",
            ),
            (DispatchError::Reentrant("c".into()), "REENTRANT_CALL"),
            (DispatchError::Internal(anyhow::anyhow!("x")), "INTERNAL"),
        ];
        for (err, expected_code) in &cases {
            assert_eq!(err.code(), *expected_code, "wrong code for {err}");
        }
    }

    #[test]
    fn caller_errors_are_classified() {
        assert!(DispatchError::UnknownCommand("x".into()).is_caller_error());
        assert!(DispatchError::MissingParam("x".into()).is_caller_error());
        assert!(!DispatchError::Internal(anyhow::anyhow!("x")).is_caller_error());
        assert!(!DispatchError::Panicked {
            command: "c".into(),
            message: "m".into()
        }
        .is_caller_error());
    }

    #[test]
    fn from_anyhow_error() {
        let err: DispatchError = anyhow::anyhow!("test anyhow").into();
        assert!(matches!(err, DispatchError::Internal(_)));
        assert_eq!(err.code(), "INTERNAL");
    }

    #[test]
    fn error_fields_carry_result_message_and_code() {
        let err = DispatchError::UnknownCommand("frobnicate".into());
        let fields = err.to_error_fields(None);
        assert_eq!(fields["result"], "error");
        assert_eq!(fields["code"], "UNKNOWN_COMMAND");
        assert!(fields["message"].as_str().unwrap().contains("frobnicate"));
        assert!(!fields.contains_key("suggested_fix"));
    }

    #[test]
    fn error_fields_suggest_close_command() {
        let err = DispatchError::UnknownCommand("create_bodyy".into());
        let known = ["create_body", "create_sketch", "get_volume"];
        let fields = err.to_error_fields(Some(&known));
        let fix = fields["suggested_fix"].as_str().unwrap();
        assert!(fix.contains("create_body"), "expected suggestion, got: {fix}");
    }

    #[test]
    fn error_fields_no_suggestion_beyond_threshold() {
        let err = DispatchError::UnknownCommand("frobnicate".into());
        let known = ["create_body", "get_volume"];
        let fields = err.to_error_fields(Some(&known));
        assert!(fields.get("suggested_fix").is_none());
    }

    #[test]
    fn fuzzy_match_prefers_closest() {
        let result = find_similar_command("get_volum", &["get_volume", "get_volumes_all"]);
        assert_eq!(result.as_deref(), Some("Did you mean 'get_volume'?"));
    }

    #[test]
    fn send_sync_static() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<DispatchError>();
    }
}
