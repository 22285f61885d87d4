//! Audit logging for macro executions.
//!
//! Every execution attempt emits an [`AuditEntry`] containing:
//! - Execution ID (UUID)
//! - SHA-256 hash of the code
//! - A preview of the first 200 chars of code
//! - Host calls the script made
//! - Duration and outcome
//!
//! The [`AuditLogger`] trait allows pluggable backends.
//! [`JsonLinesAuditLogger`] writes newline-delimited JSON to any `Write`.

use std::io::Write;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::SandboxError;

/// Maximum length of the code preview in audit entries.
const CODE_PREVIEW_MAX: usize = 200;

/// A complete audit record for a single execution attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// Unique execution identifier.
    pub execution_id: String,
    /// When the attempt started.
    pub timestamp: DateTime<Utc>,
    /// SHA-256 hash of the submitted code.
    pub code_hash: String,
    /// First characters of the code, for human review.
    pub code_preview: String,
    /// Names of the injected parameters (values are never logged).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub param_names: Vec<String>,
    /// Host calls made during execution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host_calls: Vec<HostCallAudit>,
    /// Total duration in milliseconds.
    pub duration_ms: u64,
    /// Bytes of captured output.
    pub output_bytes: usize,
    /// Final outcome.
    pub outcome: AuditOutcome,
}

/// Audit record for one `App.call(...)` made by a script.
#[derive(Debug, Clone, Serialize)]
pub struct HostCallAudit {
    /// The host command.
    pub command: String,
    /// How long the handler took, in milliseconds.
    pub duration_ms: u64,
    /// Whether the handler succeeded.
    pub success: bool,
}

impl HostCallAudit {
    /// Record a finished host call.
    pub fn new(command: &str, elapsed: Duration, success: bool) -> Self {
        Self {
            command: command.to_string(),
            duration_ms: elapsed.as_millis() as u64,
            success,
        }
    }
}

/// The outcome of an execution attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
#[non_exhaustive]
pub enum AuditOutcome {
    /// The code ran to completion.
    Success,
    /// The code was refused before running.
    Rejected {
        /// Why it was refused.
        reason: String,
    },
    /// The code raised, or the executor failed.
    Error {
        /// The error message.
        message: String,
    },
    /// The watchdog stopped the run.
    Timeout,
}

impl AuditOutcome {
    /// Short label used in log lines and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Rejected { .. } => "rejected",
            Self::Error { .. } => "error",
            Self::Timeout => "timeout",
        }
    }
}

/// Trait for audit log backends.
pub trait AuditLogger: Send + Sync {
    /// Write an audit entry.
    fn log(&self, entry: &AuditEntry);
}

/// Writes audit entries as newline-delimited JSON.
pub struct JsonLinesAuditLogger<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesAuditLogger<W> {
    /// Create a logger writing to the given sink.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the sink.
    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> AuditLogger for JsonLinesAuditLogger<W> {
    fn log(&self, entry: &AuditEntry) {
        let mut line = match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize audit entry");
                return;
            }
        };
        line.push('\n');

        let mut writer = match self.writer.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writer.write_all(line.as_bytes()) {
            tracing::warn!(error = %e, "failed to write audit entry");
        }
        let _ = writer.flush();
    }
}

/// Compute the SHA-256 hash of a string, returned as a hex string.
pub fn sha256_hex(data: &str) -> String {
    let digest = Sha256::digest(data.as_bytes());
    let mut s = String::with_capacity(digest.len() * 2);
    for b in digest {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

/// Create a code preview (first N characters, with ellipsis if truncated).
pub fn code_preview(code: &str) -> String {
    match code.char_indices().nth(CODE_PREVIEW_MAX) {
        None => code.to_string(),
        Some((end, _)) => {
            let mut preview = code[..end].to_string();
            preview.push_str("...");
            preview
        }
    }
}

/// Builder for constructing audit entries during execution.
pub struct AuditEntryBuilder {
    execution_id: String,
    timestamp: DateTime<Utc>,
    code_hash: String,
    code_preview: String,
    param_names: Vec<String>,
    host_calls: Vec<HostCallAudit>,
    output_bytes: usize,
    start: Instant,
}

impl AuditEntryBuilder {
    /// Start building an audit entry for an execution attempt.
    pub fn new(code: &str) -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            code_hash: sha256_hex(code),
            code_preview: code_preview(code),
            param_names: Vec::new(),
            host_calls: Vec::new(),
            output_bytes: 0,
            start: Instant::now(),
        }
    }

    /// The execution ID this entry will carry.
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Record the injected parameter names.
    pub fn param_names<'a>(&mut self, names: impl IntoIterator<Item = &'a String>) {
        self.param_names = names.into_iter().cloned().collect();
    }

    /// Record host calls made by the script.
    pub fn record_host_calls(&mut self, calls: Vec<HostCallAudit>) {
        self.host_calls.extend(calls);
    }

    /// Record how much output was captured.
    pub fn output_bytes(&mut self, bytes: usize) {
        self.output_bytes = bytes;
    }

    /// Finalize the audit entry with the execution result.
    pub fn finish<T>(self, result: &Result<T, SandboxError>) -> AuditEntry {
        let outcome = match result {
            Ok(_) => AuditOutcome::Success,
            Err(SandboxError::Timeout { .. } | SandboxError::StepLimit { .. }) => {
                AuditOutcome::Timeout
            }
            Err(e) if e.is_rejection() => AuditOutcome::Rejected {
                reason: e.to_string(),
            },
            Err(e) => AuditOutcome::Error {
                message: e.to_string(),
            },
        };

        AuditEntry {
            execution_id: self.execution_id,
            timestamp: self.timestamp,
            code_hash: self.code_hash,
            code_preview: self.code_preview,
            param_names: self.param_names,
            host_calls: self.host_calls,
            duration_ms: self.start.elapsed().as_millis() as u64,
            output_bytes: self.output_bytes,
            outcome,
        }
    }
}

/// A no-op audit logger for when auditing is not needed.
pub struct NoopAuditLogger;

impl AuditLogger for NoopAuditLogger {
    fn log(&self, _entry: &AuditEntry) {}
}

/// An audit logger that emits structured events via [`tracing`].
///
/// Entries are logged at `INFO` with `audit = true` for easy filtering.
pub struct TracingAuditLogger;

impl AuditLogger for TracingAuditLogger {
    fn log(&self, entry: &AuditEntry) {
        tracing::info!(
            audit = true,
            execution_id = %entry.execution_id,
            code_hash = %entry.code_hash,
            duration_ms = entry.duration_ms,
            output_bytes = entry.output_bytes,
            host_calls = entry.host_calls.len(),
            outcome = entry.outcome.label(),
            "audit"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::Violation;

    #[test]
    fn sha256_hex_produces_correct_hash() {
        // Known SHA-256 of "hello"
        assert_eq!(
            sha256_hex("hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn code_preview_short_code_unchanged() {
        let code = "result = 2 + 2";
        assert_eq!(code_preview(code), code);
    }

    #[test]
    fn code_preview_truncates_on_char_boundary() {
        let code = "\u{4E00}".repeat(300);
        let preview = code_preview(&code);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 203);

        let exact = "a".repeat(200);
        assert_eq!(code_preview(&exact), exact);
    }

    #[test]
    fn builder_classifies_outcomes() {
        let ok: Result<(), SandboxError> = Ok(());
        assert!(matches!(
            AuditEntryBuilder::new("x = 1").finish(&ok).outcome,
            AuditOutcome::Success
        ));

        let rejected: Result<(), SandboxError> = Err(SandboxError::ValidationFailed {
            violations: vec![Violation::DeniedIdentifier {
                name: "eval".into(),
                line: 1,
            }],
        });
        let entry = AuditEntryBuilder::new("eval('1')").finish(&rejected);
        assert_eq!(entry.outcome.label(), "rejected");

        let timeout: Result<(), SandboxError> = Err(SandboxError::Timeout { timeout_ms: 10 });
        assert_eq!(
            AuditEntryBuilder::new("while True: pass")
                .finish(&timeout)
                .outcome
                .label(),
            "timeout"
        );

        let script: Result<(), SandboxError> = Err(SandboxError::Script {
            kind: "ValueError".into(),
            message: "boom".into(),
            traceback: String::new(),
            output: String::new(),
        });
        match AuditEntryBuilder::new("raise ValueError('boom')")
            .finish(&script)
            .outcome
        {
            AuditOutcome::Error { message } => assert_eq!(message, "ValueError: boom"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn json_lines_logger_writes_valid_json() {
        let logger = JsonLinesAuditLogger::new(Vec::new());
        let mut builder = AuditEntryBuilder::new("App.call('list_documents')");
        let params = vec!["width".to_string()];
        builder.param_names(&params);
        builder.record_host_calls(vec![HostCallAudit::new(
            "list_documents",
            Duration::from_millis(3),
            true,
        )]);
        let entry = builder.finish::<()>(&Ok(()));
        logger.log(&entry);

        let output = String::from_utf8(logger.into_inner()).unwrap();
        assert!(output.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(parsed["outcome"]["status"], "success");
        assert_eq!(parsed["param_names"][0], "width");
        assert_eq!(parsed["host_calls"][0]["command"], "list_documents");
        assert_eq!(parsed["host_calls"][0]["duration_ms"], 3);
        assert_eq!(parsed["code_hash"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn json_lines_logger_appends_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let open = || {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .unwrap()
        };

        let first = JsonLinesAuditLogger::new(open());
        first.log(&AuditEntryBuilder::new("x = 1").finish::<()>(&Ok(())));
        drop(first);

        let second = JsonLinesAuditLogger::new(open());
        let timeout: Result<(), SandboxError> = Err(SandboxError::Timeout { timeout_ms: 10 });
        second.log(&AuditEntryBuilder::new("while True: pass").finish(&timeout));
        drop(second);

        let contents = std::fs::read_to_string(&path).unwrap();
        let entries: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["outcome"]["status"], "success");
        assert_eq!(entries[1]["code_preview"], "while True: pass");
        assert_ne!(entries[0]["execution_id"], entries[1]["execution_id"]);
    }

    #[test]
    fn empty_collections_are_omitted() {
        let entry = AuditEntryBuilder::new("x = 1").finish::<()>(&Ok(()));
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("host_calls").is_none());
        assert!(json.get("param_names").is_none());
    }

    #[test]
    fn tracing_logger_does_not_panic() {
        let entry = AuditEntryBuilder::new("x = 1").finish::<()>(&Ok(()));
        TracingAuditLogger.log(&entry);
        NoopAuditLogger.log(&entry);
    }
}
