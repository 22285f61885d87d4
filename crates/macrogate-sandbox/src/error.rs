//! Error types for the macro sandbox.

use thiserror::Error;

use crate::validator::Violation;

/// Errors that can occur while validating or executing a macro.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SandboxError {
    /// Code failed validation and was not executed.
    #[error("Code validation failed: {}", summary(.violations))]
    ValidationFailed {
        /// Every violation, in source order.
        violations: Vec<Violation>,
    },

    /// Code exceeds the configured maximum size.
    #[error("code exceeds maximum size of {max} bytes (got {actual})")]
    CodeTooLarge {
        /// Maximum allowed size.
        max: usize,
        /// Actual size.
        actual: usize,
    },

    /// An injected parameter cannot be bound.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam {
        /// The parameter name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Captured output exceeded the configured maximum.
    #[error("output exceeds maximum size of {max} bytes")]
    OutputTooLarge {
        /// Maximum allowed size.
        max: usize,
    },

    /// The watchdog stopped the run.
    #[error("execution timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The step budget ran out.
    #[error("execution exceeded the step limit of {max}")]
    StepLimit {
        /// Configured step budget.
        max: u64,
    },

    /// The script raised an exception nobody caught.
    #[error("{kind}: {message}")]
    Script {
        /// Exception type name.
        kind: String,
        /// Exception message.
        message: String,
        /// Python-style traceback.
        traceback: String,
        /// Output captured before the exception.
        output: String,
    },

    /// The executor itself failed.
    #[error("sandbox execution failed: {0}")]
    Internal(#[from] anyhow::Error),
}

fn summary(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl SandboxError {
    /// Stable error code for the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationFailed { .. } => "VALIDATION_FAILED",
            Self::CodeTooLarge { .. } => "CODE_TOO_LARGE",
            Self::InvalidParam { .. } => "INVALID_PARAM",
            Self::OutputTooLarge { .. } => "OUTPUT_TOO_LARGE",
            Self::Timeout { .. } => "TIMEOUT",
            Self::StepLimit { .. } => "STEP_LIMIT",
            Self::Script { .. } => "SCRIPT_ERROR",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Diagnostic trace for script exceptions.
    pub fn traceback(&self) -> Option<&str> {
        match self {
            Self::Script { traceback, .. } => Some(traceback),
            _ => None,
        }
    }

    /// Output the script printed before failing, if any.
    pub fn partial_output(&self) -> Option<&str> {
        match self {
            Self::Script { output, .. } if !output.is_empty() => Some(output),
            _ => None,
        }
    }

    /// Whether the code was refused without running.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::ValidationFailed { .. } | Self::CodeTooLarge { .. } | Self::InvalidParam { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_failure_joins_messages() {
        let err = SandboxError::ValidationFailed {
            violations: vec![
                Violation::DeniedIdentifier {
                    name: "eval".into(),
                    line: 1,
                },
                Violation::DeniedCall {
                    name: "eval".into(),
                    line: 1,
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "Code validation failed: Using 'eval' is not allowed for security reasons; \
             Calling 'eval' is not allowed for security reasons"
        );
        assert_eq!(err.code(), "VALIDATION_FAILED");
        assert!(err.is_rejection());
    }

    #[test]
    fn script_error_exposes_traceback() {
        let err = SandboxError::Script {
            kind: "ValueError".into(),
            message: "bad".into(),
            traceback: "Traceback (most recent call last):\n".into(),
            output: String::new(),
        };
        assert_eq!(err.to_string(), "ValueError: bad");
        assert!(err.traceback().is_some());
        assert!(err.partial_output().is_none());
        assert!(!err.is_rejection());
    }

    #[test]
    fn timeout_display() {
        let err = SandboxError::Timeout { timeout_ms: 250 };
        assert_eq!(err.to_string(), "execution timed out after 250ms");
        assert_eq!(err.code(), "TIMEOUT");
    }
}
