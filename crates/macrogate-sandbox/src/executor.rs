//! Sandbox executor: validates macro code and runs it in a fresh interpreter.
//!
//! Each execution gets a brand new interpreter. No state leaks between calls.
//!
//! Interpreter values are `!Send`, so validation, parsing and evaluation all
//! happen on a dedicated thread with a large stack; the caller blocks until it
//! finishes. The public API is synchronous and `Send + Sync`, which suits the
//! gateway's single tick thread.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use serde_json::{Map, Value as Json};

use crate::audit::{AuditEntryBuilder, AuditLogger, HostCallAudit, NoopAuditLogger};
use crate::capability::CapabilitySet;
use crate::error::SandboxError;
use crate::runtime::exception::Abort;
use crate::runtime::{self, Limits, RunFailure};
use crate::script::is_identifier;
use crate::validator::{self, SecurityPolicy, ValidationResult};

/// Stack size of the interpreter thread.
const INTERPRETER_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Configuration for the sandbox executor.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Wall-clock budget for one execution.
    pub timeout: Duration,
    /// Maximum size of submitted code in bytes.
    pub max_code_size: usize,
    /// Maximum bytes of captured output.
    pub max_output_size: usize,
    /// Maximum script call depth.
    pub max_recursion_depth: usize,
    /// Maximum length of a single string or collection a script may build.
    pub max_collection_len: usize,
    /// Optional budget of interpreter steps.
    pub max_steps: Option<u64>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_code_size: 64 * 1024,     // 64 KB
            max_output_size: 1024 * 1024, // 1 MB
            max_recursion_depth: 100,
            max_collection_len: 10_000_000,
            max_steps: None,
        }
    }
}

impl SandboxConfig {
    fn limits(&self) -> Limits {
        Limits {
            timeout: self.timeout,
            max_steps: self.max_steps,
            max_output: self.max_output_size,
            max_recursion: self.max_recursion_depth,
            max_collection_len: self.max_collection_len,
        }
    }
}

/// What a successful execution produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOutput {
    /// Everything the script printed.
    pub output: String,
    /// JSON form of the script's top-level `result` binding, if it bound one.
    pub value: Option<Json>,
}

/// The sandbox executor.
///
/// Holds the process-wide [`SecurityPolicy`] and [`CapabilitySet`] by
/// reference; every validation and execution goes through the same instances.
pub struct SandboxExecutor {
    config: SandboxConfig,
    policy: Arc<SecurityPolicy>,
    capabilities: Arc<CapabilitySet>,
    audit_logger: Arc<dyn AuditLogger>,
    #[cfg(feature = "metrics")]
    metrics: Option<Arc<crate::metrics::SandboxMetrics>>,
}

impl SandboxExecutor {
    /// Create an executor over the shared policy and capability set.
    pub fn new(
        config: SandboxConfig,
        policy: Arc<SecurityPolicy>,
        capabilities: Arc<CapabilitySet>,
    ) -> Self {
        Self {
            config,
            policy,
            capabilities,
            audit_logger: Arc::new(NoopAuditLogger),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Send audit entries to `logger`.
    pub fn with_audit_logger(mut self, logger: Arc<dyn AuditLogger>) -> Self {
        self.audit_logger = logger;
        self
    }

    /// Record executions in `metrics`.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: Arc<crate::metrics::SandboxMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The executor's configuration.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// The security policy every validation uses.
    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    /// The capability bindings every execution receives.
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Validate code without running it.
    pub fn validate(&self, code: &str) -> Result<ValidationResult, SandboxError> {
        self.check_size(code)?;
        let policy = &*self.policy;
        on_interpreter_thread(move || validator::validate_code(code, policy).0)
    }

    /// Validate and run `code` with `params` bound as globals.
    ///
    /// Unsafe code is never executed; the error carries every violation.
    /// Script exceptions come back as [`SandboxError::Script`] with a
    /// traceback, and nothing a script does can panic the caller.
    pub fn execute(
        &self,
        code: &str,
        params: &Map<String, Json>,
    ) -> Result<ExecutionOutput, SandboxError> {
        tracing::debug!(code_len = code.len(), params = params.len(), "execute: starting");

        let mut audit = AuditEntryBuilder::new(code);
        audit.param_names(params.keys());

        let (result, host_calls) = match self.check_size(code).and_then(|()| self.check_params(params)) {
            Ok(()) => self.run(code, params),
            Err(e) => (Err(e), Vec::new()),
        };

        audit.record_host_calls(host_calls);
        if let Ok(output) = &result {
            audit.output_bytes(output.output.len());
        }
        let entry = audit.finish(&result);
        self.audit_logger.log(&entry);

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_execution(entry.outcome.label(), entry.duration_ms as f64 / 1000.0);
            if let Err(e) = &result {
                metrics.record_error(e.code());
            }
        }

        match &result {
            Ok(_) => tracing::info!(
                execution_id = %entry.execution_id,
                duration_ms = entry.duration_ms,
                "execute: complete"
            ),
            Err(e) if e.is_rejection() => tracing::warn!(
                execution_id = %entry.execution_id,
                error = %e,
                "execute: rejected"
            ),
            Err(e) => tracing::warn!(
                execution_id = %entry.execution_id,
                code = e.code(),
                error = %e,
                "execute: failed"
            ),
        }

        result
    }

    fn check_size(&self, code: &str) -> Result<(), SandboxError> {
        if code.len() > self.config.max_code_size {
            return Err(SandboxError::CodeTooLarge {
                max: self.config.max_code_size,
                actual: code.len(),
            });
        }
        Ok(())
    }

    fn check_params(&self, params: &Map<String, Json>) -> Result<(), SandboxError> {
        for name in params.keys() {
            let reason = if !is_identifier(name) {
                "not a valid identifier"
            } else if name == "params" {
                "shadows the params dict"
            } else if self.capabilities.contains(name) {
                "shadows a capability binding"
            } else {
                continue;
            };
            return Err(SandboxError::InvalidParam {
                name: name.clone(),
                reason: reason.into(),
            });
        }
        Ok(())
    }

    fn run(
        &self,
        code: &str,
        params: &Map<String, Json>,
    ) -> (Result<ExecutionOutput, SandboxError>, Vec<HostCallAudit>) {
        let policy = &*self.policy;
        let capabilities = &*self.capabilities;
        let limits = self.config.limits();

        let outcome = on_interpreter_thread(|| {
            let (verdict, program) = validator::validate_code(code, policy);
            if !verdict.is_safe() {
                return Err(Refused::Unsafe(verdict));
            }
            let Some(program) = program else {
                return Err(Refused::Unparsed);
            };
            runtime::run(&program, params, capabilities, &limits).map_err(Refused::Failed)
        });

        match outcome {
            Err(e) => (Err(e), Vec::new()),
            Ok(Ok(run)) => (
                Ok(ExecutionOutput {
                    output: run.output,
                    value: run.result,
                }),
                run.host_calls,
            ),
            Ok(Err(Refused::Unsafe(verdict))) => (
                Err(SandboxError::ValidationFailed {
                    violations: verdict.into_violations(),
                }),
                Vec::new(),
            ),
            Ok(Err(Refused::Unparsed)) => (
                Err(SandboxError::Internal(anyhow!("validated code produced no program"))),
                Vec::new(),
            ),
            Ok(Err(Refused::Failed(failure))) => self.map_failure(failure),
        }
    }

    fn map_failure(
        &self,
        failure: RunFailure,
    ) -> (Result<ExecutionOutput, SandboxError>, Vec<HostCallAudit>) {
        match failure {
            RunFailure::Script {
                kind,
                message,
                traceback,
                output,
                host_calls,
            } => (
                Err(SandboxError::Script {
                    kind: kind.to_string(),
                    message,
                    traceback,
                    output,
                }),
                host_calls,
            ),
            RunFailure::Abort(abort) => {
                let err = match abort {
                    Abort::Timeout => SandboxError::Timeout {
                        timeout_ms: self.config.timeout.as_millis() as u64,
                    },
                    Abort::StepLimit => SandboxError::StepLimit {
                        max: self.config.max_steps.unwrap_or_default(),
                    },
                    Abort::OutputLimit => SandboxError::OutputTooLarge {
                        max: self.config.max_output_size,
                    },
                };
                (Err(err), Vec::new())
            }
        }
    }
}

enum Refused {
    Unsafe(ValidationResult),
    Unparsed,
    Failed(RunFailure),
}

/// Run `f` on a scoped thread with a stack big enough for deep scripts.
fn on_interpreter_thread<T, F>(f: F) -> Result<T, SandboxError>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    std::thread::scope(|scope| {
        let handle = std::thread::Builder::new()
            .name("macrogate-interpreter".into())
            .stack_size(INTERPRETER_STACK_SIZE)
            .spawn_scoped(scope, f)
            .map_err(|e| SandboxError::Internal(anyhow!("failed to spawn interpreter thread: {e}")))?;
        handle.join().map_err(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            tracing::error!(panic = %message, "interpreter thread panicked");
            SandboxError::Internal(anyhow!("interpreter panicked: {message}"))
        })
    })
}
