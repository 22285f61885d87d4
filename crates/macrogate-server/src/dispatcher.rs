//! Command dispatcher: core commands plus the external handler table.
//!
//! Code-carrying commands go to the [`SandboxExecutor`]; every other type tag
//! is looked up in the [`HandlerTable`]. Whatever happens, the caller gets a
//! [`Response`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use macrogate_error::DispatchError;
use macrogate_protocol::{Command, Response};
use macrogate_sandbox::audit::AuditLogger;
use macrogate_sandbox::{
    CapabilitySet, SandboxConfig, SandboxError, SandboxExecutor, SecurityPolicy, Violation,
};
use serde_json::{Map, Value};

use crate::bridge::{HandlerBridge, HostIdentity};
use crate::handler::HandlerTable;
use crate::macros;
use crate::report::ReportLog;
use crate::state::RequestHandler;

/// Type tags the dispatcher answers itself.
pub const CORE_COMMANDS: &[&str] = &[
    "execute_code",
    "validate_macro_code",
    "validate_code",
    "run_macro",
    "update_macro",
    "get_report",
];

/// Routes commands to the sandbox or to domain handlers.
pub struct Dispatcher {
    executor: SandboxExecutor,
    handlers: Arc<HandlerTable>,
    macro_dir: Option<PathBuf>,
    report: ReportLog,
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    handlers: HandlerTable,
    sandbox: SandboxConfig,
    policy: Arc<SecurityPolicy>,
    host: HostIdentity,
    macro_dir: Option<PathBuf>,
    report: ReportLog,
    audit_logger: Option<Arc<dyn AuditLogger>>,
}

impl DispatcherBuilder {
    /// Sandbox limits.
    pub fn sandbox_config(mut self, config: SandboxConfig) -> Self {
        self.sandbox = config;
        self
    }

    /// The process-wide security policy.
    pub fn policy(mut self, policy: Arc<SecurityPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// How the host handle appears to scripts.
    pub fn host(mut self, host: HostIdentity) -> Self {
        self.host = host;
        self
    }

    /// Directory relative macro paths resolve against.
    pub fn macro_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.macro_dir = Some(dir.into());
        self
    }

    /// Log served by `get_report`.
    pub fn report(mut self, report: ReportLog) -> Self {
        self.report = report;
        self
    }

    /// Destination for execution audit entries.
    pub fn audit_logger(mut self, logger: Arc<dyn AuditLogger>) -> Self {
        self.audit_logger = Some(logger);
        self
    }

    /// Wire the handler table into the sandbox's host handle and build.
    pub fn build(self) -> Dispatcher {
        let handlers = Arc::new(self.handlers);
        for name in CORE_COMMANDS {
            if handlers.contains(name) {
                tracing::warn!(command = name, "handler is shadowed by a core command");
            }
        }

        let bridge = Arc::new(HandlerBridge::new(handlers.clone(), &self.host));
        let capabilities = CapabilitySet::standard().with_host(self.host.aliases.iter().cloned(), bridge);
        let mut executor = SandboxExecutor::new(self.sandbox, self.policy, Arc::new(capabilities));
        if let Some(logger) = self.audit_logger {
            executor = executor.with_audit_logger(logger);
        }

        Dispatcher {
            executor,
            handlers,
            macro_dir: self.macro_dir,
            report: self.report,
        }
    }
}

impl Dispatcher {
    /// Start building a dispatcher over `handlers`.
    pub fn builder(handlers: HandlerTable) -> DispatcherBuilder {
        DispatcherBuilder {
            handlers,
            sandbox: SandboxConfig::default(),
            policy: Arc::new(SecurityPolicy::default()),
            host: HostIdentity::default(),
            macro_dir: None,
            report: ReportLog::default(),
            audit_logger: None,
        }
    }

    /// The sandbox executor.
    pub fn executor(&self) -> &SandboxExecutor {
        &self.executor
    }

    /// The report log.
    pub fn report(&self) -> &ReportLog {
        &self.report
    }

    /// Every type tag this dispatcher accepts.
    pub fn command_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = CORE_COMMANDS.to_vec();
        names.extend(self.handlers.names().into_iter().filter(|n| !CORE_COMMANDS.contains(n)));
        names
    }

    /// Handle one command.
    pub fn dispatch(&self, command: &Command) -> Response {
        let started = Instant::now();
        let params = &command.params;
        let response = match command.kind.as_str() {
            "execute_code" => self.execute_code(params),
            "validate_macro_code" | "validate_code" => self.validate_code(params),
            "run_macro" => self.run_macro(params),
            "update_macro" => self.update_macro(params),
            "get_report" => self.get_report(),
            kind => self.call_handler(kind, params),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if response.is_success() {
            tracing::info!(command = %command.kind, elapsed_ms, "command succeeded");
        } else {
            tracing::warn!(
                command = %command.kind,
                elapsed_ms,
                message = response.message.as_deref().unwrap_or_default(),
                "command failed"
            );
        }
        response
    }

    fn execute_code(&self, params: &Map<String, Value>) -> Response {
        let code = match required_str(params, "code") {
            Ok(code) => code,
            Err(e) => return error_response("execute_code", &e, None),
        };
        if params.get("validate") == Some(&Value::Bool(false)) {
            tracing::warn!("execute_code: validate=false ignored, validation always runs");
        }

        match self.executor.execute(code, &Map::new()) {
            Ok(out) => Response::success()
                .with_message("Code executed successfully")
                .with_field("output", out.output)
                .with_field("value", out.value.unwrap_or(Value::Null)),
            Err(SandboxError::ValidationFailed { violations }) => {
                let summary = join_messages(&violations);
                Response::error(format!("Security validation failed: {summary}"))
                    .with_field("code", "VALIDATION_FAILED")
                    .with_field("violations", violations_json(&violations))
                    .with_field("help", self.validation_help())
            }
            Err(e) => sandbox_error_response(&e),
        }
    }

    fn validate_code(&self, params: &Map<String, Value>) -> Response {
        let code = match self.code_or_macro(params) {
            Ok(code) => code,
            Err(e) => return error_response("validate_macro_code", &e, None),
        };

        match self.executor.validate(&code) {
            Ok(verdict) if verdict.is_safe() => {
                Response::success().with_message("Macro code validation successful")
            }
            Ok(verdict) => Response::error(format!("Code validation failed: {}", verdict.summary()))
                .with_field("code", "VALIDATION_FAILED")
                .with_field("violations", violations_json(verdict.violations())),
            Err(e) => sandbox_error_response(&e),
        }
    }

    fn run_macro(&self, params: &Map<String, Value>) -> Response {
        let prepared = required_str(params, "macro_path").and_then(|raw| {
            let path = macros::resolve(self.macro_dir.as_deref(), raw, "macro_path")?;
            let args = macro_args(params)?;
            let code = macros::read(&path)?;
            Ok((path, args, code))
        });
        let (path, mut args, code) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return error_response("run_macro", &e, None),
        };

        let document = macros::document_name(&path, &args);
        args.remove(macros::DOC_NAME_PARAM);
        tracing::info!(
            path = %path.display(),
            document = %document,
            params = ?args.keys().collect::<Vec<_>>(),
            "running macro"
        );

        match self.executor.execute(&code, &args) {
            Ok(out) => Response::success()
                .with_message(format!("Macro executed successfully in document {document}"))
                .with_field("document", document)
                .with_field("output", out.output)
                .with_field("value", out.value.unwrap_or(Value::Null)),
            Err(e) => sandbox_error_response(&e),
        }
    }

    fn update_macro(&self, params: &Map<String, Value>) -> Response {
        let written = required_str(params, "macro_name").and_then(|name| {
            let code = match params.get("code") {
                Some(Value::String(code)) => code,
                None | Some(Value::Null) => return Err(DispatchError::MissingParam("code".into())),
                Some(other) => {
                    return Err(DispatchError::InvalidParam {
                        name: "code".into(),
                        reason: format!("expected a string, got {}", json_type(other)),
                    })
                }
            };
            macros::write(self.macro_dir.as_deref(), name, code)
        });
        match written {
            Ok(path) => {
                let path = path.display().to_string();
                Response::success()
                    .with_message(format!("Macro file updated successfully: {path}"))
                    .with_field("path", path)
            }
            Err(e) => error_response("update_macro", &e, None),
        }
    }

    fn get_report(&self) -> Response {
        Response::success().with_field("report", self.report.snapshot())
    }

    fn call_handler(&self, kind: &str, params: &Map<String, Value>) -> Response {
        match self.handlers.call(kind, params) {
            Ok(fields) => Response::from_fields(fields).unwrap_or_else(|e| {
                tracing::error!(command = kind, error = %e, "handler returned an invalid payload");
                Response::error(format!("Handler for '{kind}' returned an invalid payload: {e}"))
            }),
            Err(e) => {
                let known = self.command_names();
                error_response(kind, &e, Some(known.as_slice()))
            }
        }
    }

    fn code_or_macro(&self, params: &Map<String, Value>) -> Result<String, DispatchError> {
        match params.get("code") {
            Some(Value::String(code)) if !code.is_empty() => return Ok(code.clone()),
            Some(Value::String(_)) | Some(Value::Null) | None => {}
            Some(other) => {
                return Err(DispatchError::InvalidParam {
                    name: "code".into(),
                    reason: format!("expected a string, got {}", json_type(other)),
                })
            }
        }
        let name = required_str(params, "macro_name")
            .map_err(|_| DispatchError::MissingParam("code".into()))?;
        let path = macros::resolve(self.macro_dir.as_deref(), name, "macro_name")?;
        macros::read(&path)
    }

    fn validation_help(&self) -> String {
        let allowed: Vec<&str> = self
            .executor
            .policy()
            .allowed_modules()
            .iter()
            .map(String::as_str)
            .collect();
        format!(
            "For safety, code may only import these modules: {}. \
             Dynamic evaluation, file access and introspection are blocked.",
            allowed.join(", ")
        )
    }
}

impl RequestHandler for Dispatcher {
    fn handle(&self, command: Command) -> Response {
        self.dispatch(&command)
    }
}

fn required_str<'a>(params: &'a Map<String, Value>, name: &str) -> Result<&'a str, DispatchError> {
    match params.get(name) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(Value::String(_)) | Some(Value::Null) | None => {
            Err(DispatchError::MissingParam(name.to_string()))
        }
        Some(other) => Err(DispatchError::InvalidParam {
            name: name.to_string(),
            reason: format!("expected a string, got {}", json_type(other)),
        }),
    }
}

/// The `params` object of a `run_macro` request.
fn macro_args(params: &Map<String, Value>) -> Result<Map<String, Value>, DispatchError> {
    match params.get("params") {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(args)) => Ok(args.clone()),
        Some(other) => Err(DispatchError::InvalidParam {
            name: "params".into(),
            reason: format!("expected an object, got {}", json_type(other)),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join_messages(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn violations_json(violations: &[Violation]) -> Value {
    Value::Array(violations.iter().map(Violation::to_json).collect())
}

/// Error response for a dispatcher or handler failure.
///
/// Caller mistakes carry `code` and maybe `suggested_fix`; host-side
/// failures also carry a `traceback`.
fn error_response(command: &str, err: &DispatchError, known: Option<&[&str]>) -> Response {
    let response = Response::from_fields(err.to_error_fields(known))
        .unwrap_or_else(|_| Response::error(err.to_string()));
    if err.is_caller_error() {
        response
    } else {
        response.with_traceback(error_trace(command, err))
    }
}

fn error_trace(command: &str, err: &DispatchError) -> String {
    let detail = match err {
        DispatchError::Internal(inner) => format!("{inner:#}"),
        other => other.to_string(),
    };
    format!("Error in command '{command}' [{}]:\n  {detail}", err.code())
}

fn sandbox_error_response(err: &SandboxError) -> Response {
    let mut response = Response::error(err.to_string()).with_field("code", err.code());
    if let Some(traceback) = err.traceback() {
        response = response.with_traceback(traceback);
    }
    if let Some(output) = err.partial_output() {
        response = response.with_field("output", output);
    }
    if let SandboxError::ValidationFailed { violations } = err {
        response = response.with_field("violations", violations_json(violations));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn command(kind: &str, params: Value) -> Command {
        Command {
            kind: kind.into(),
            params: params.as_object().cloned().unwrap_or_default(),
        }
    }

    fn handlers() -> HandlerTable {
        HandlerTable::new()
            .with("list_documents", |_| {
                let mut out = Map::new();
                out.insert("documents".into(), json!(["Bracket", "Gear"]));
                Ok(out)
            })
            .with("get_object", |params| {
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| DispatchError::MissingParam("name".into()))?;
                let mut out = Map::new();
                out.insert("name".into(), json!(name));
                out.insert("volume".into(), json!(1000.0));
                Ok(out)
            })
            .with("recompute", |_| {
                Err(DispatchError::Internal(
                    anyhow::anyhow!("solver diverged").context("recompute failed"),
                ))
            })
            .with("crash", |_| panic!("segfault in kernel"))
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::builder(handlers()).build()
    }

    #[test]
    fn execute_code_returns_output_and_value() {
        let response = dispatcher().dispatch(&command(
            "execute_code",
            json!({"code": "print('hi')\nresult = 2 + 2"}),
        ));
        assert!(response.is_success(), "{response:?}");
        assert_eq!(response.message.as_deref(), Some("Code executed successfully"));
        assert_eq!(response.field("output").unwrap(), "hi\n");
        assert_eq!(response.field("value").unwrap(), &json!(4));
    }

    #[test]
    fn execute_code_rejects_disallowed_import() {
        let response = dispatcher().dispatch(&command("execute_code", json!({"code": "import os"})));
        assert!(!response.is_success());
        let message = response.message.clone().unwrap();
        assert!(message.starts_with("Security validation failed: "), "{message}");
        assert!(message.contains("'os'"), "{message}");
        assert_eq!(response.field("code").unwrap(), "VALIDATION_FAILED");
        assert_eq!(response.field("violations").unwrap().as_array().unwrap().len(), 1);
        assert!(response.field("help").unwrap().as_str().unwrap().contains("math"));
    }

    #[test]
    fn execute_code_ignores_validate_false() {
        let response = dispatcher().dispatch(&command(
            "execute_code",
            json!({"code": "eval('1')", "validate": false}),
        ));
        assert!(!response.is_success());
        assert_eq!(response.field("code").unwrap(), "VALIDATION_FAILED");
    }

    #[test]
    fn execute_code_requires_code() {
        let response = dispatcher().dispatch(&command("execute_code", json!({})));
        assert!(!response.is_success());
        assert_eq!(response.field("code").unwrap(), "MISSING_PARAM");
        assert!(response.traceback.is_none());
    }

    #[test]
    fn script_exception_carries_traceback_and_partial_output() {
        let response = dispatcher().dispatch(&command(
            "execute_code",
            json!({"code": "print('before')\nx = 1 / 0"}),
        ));
        assert!(!response.is_success());
        assert_eq!(
            response.message.as_deref(),
            Some("ZeroDivisionError: division by zero")
        );
        assert!(response.traceback.as_deref().unwrap().contains("line 2"));
        assert_eq!(response.field("output").unwrap(), "before\n");
        assert_eq!(response.field("code").unwrap(), "SCRIPT_ERROR");
    }

    #[test]
    fn scripts_reach_domain_handlers_through_app() {
        let response = dispatcher().dispatch(&command(
            "execute_code",
            json!({"code": "obj = App.call('get_object', {'name': 'Box'})\nresult = obj['volume']"}),
        ));
        assert!(response.is_success(), "{response:?}");
        assert_eq!(response.field("value").unwrap(), &json!(1000.0));
    }

    #[test]
    fn scripts_cannot_start_scripts() {
        let response = dispatcher().dispatch(&command(
            "execute_code",
            json!({"code": "App.call('execute_code', {'code': 'result = 1'})"}),
        ));
        assert!(!response.is_success());
        let message = response.message.unwrap();
        assert!(message.contains("re-entrant"), "{message}");
    }

    #[test]
    fn validate_reports_success_and_violations() {
        let d = dispatcher();
        let ok = d.dispatch(&command("validate_macro_code", json!({"code": "import math"})));
        assert!(ok.is_success());
        assert_eq!(ok.message.as_deref(), Some("Macro code validation successful"));

        let bad = d.dispatch(&command(
            "validate_code",
            json!({"code": "import subprocess\nopen('x')"}),
        ));
        assert!(!bad.is_success());
        assert!(bad
            .message
            .as_deref()
            .unwrap()
            .starts_with("Code validation failed: "));
        assert!(bad.field("violations").unwrap().as_array().unwrap().len() >= 2);
    }

    #[test]
    fn validate_does_not_execute() {
        let response = dispatcher().dispatch(&command(
            "validate_code",
            json!({"code": "x = 1 / 0"}),
        ));
        assert!(response.is_success());
    }

    #[test]
    fn validate_reads_named_macro() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.FCMacro"), "import socket\n").unwrap();
        let d = Dispatcher::builder(HandlerTable::new())
            .macro_dir(dir.path())
            .build();

        let response = d.dispatch(&command("validate_macro_code", json!({"macro_name": "bad"})));
        assert!(!response.is_success());
        assert!(response.message.unwrap().contains("socket"));

        let response = d.dispatch(&command("validate_macro_code", json!({})));
        assert_eq!(response.field("code").unwrap(), "MISSING_PARAM");
    }

    #[test]
    fn run_macro_injects_params_and_names_document() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("box.FCMacro"),
            "result = {'volume': width * height, 'keys': sorted(params)}\n",
        )
        .unwrap();
        let d = Dispatcher::builder(HandlerTable::new())
            .macro_dir(dir.path())
            .build();

        let response = d.dispatch(&command(
            "run_macro",
            json!({"macro_path": "box", "params": {"width": 3, "height": 4, "doc_name": "Shelf"}}),
        ));
        assert!(response.is_success(), "{response:?}");
        assert_eq!(
            response.message.as_deref(),
            Some("Macro executed successfully in document Shelf")
        );
        assert_eq!(response.field("document").unwrap(), "Shelf");
        assert_eq!(
            response.field("value").unwrap(),
            &json!({"volume": 12, "keys": ["height", "width"]})
        );
    }

    #[test]
    fn run_macro_failures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("evil.FCMacro"), "import os\n").unwrap();
        let d = Dispatcher::builder(HandlerTable::new())
            .macro_dir(dir.path())
            .build();

        let missing = d.dispatch(&command("run_macro", json!({"macro_path": "nope"})));
        assert_eq!(missing.message.as_deref(), Some("Macro file does not exist: nope"));

        let escape = d.dispatch(&command("run_macro", json!({"macro_path": "../evil.FCMacro"})));
        assert_eq!(escape.field("code").unwrap(), "INVALID_PARAM");

        let unsafe_macro = d.dispatch(&command("run_macro", json!({"macro_path": "evil"})));
        assert_eq!(unsafe_macro.field("code").unwrap(), "VALIDATION_FAILED");
        assert!(unsafe_macro.message.unwrap().starts_with("Code validation failed: "));

        let bad_params = d.dispatch(&command(
            "run_macro",
            json!({"macro_path": "evil", "params": [1, 2]}),
        ));
        assert_eq!(bad_params.field("code").unwrap(), "INVALID_PARAM");
    }

    #[test]
    fn update_macro_writes_then_runs() {
        let dir = tempfile::tempdir().unwrap();
        let d = Dispatcher::builder(HandlerTable::new())
            .macro_dir(dir.path())
            .build();

        let response = d.dispatch(&command(
            "update_macro",
            json!({"macro_name": "plate", "code": "result = size * 2\n"}),
        ));
        assert!(response.is_success(), "{response:?}");
        let path = dir.path().join("plate.FCMacro");
        assert_eq!(
            response.message.as_deref(),
            Some(format!("Macro file updated successfully: {}", path.display()).as_str())
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "result = size * 2\n");

        let run = d.dispatch(&command(
            "run_macro",
            json!({"macro_path": "plate", "params": {"size": 21}}),
        ));
        assert_eq!(run.field("value").unwrap(), &json!(42));
    }

    #[test]
    fn update_macro_failures() {
        let dir = tempfile::tempdir().unwrap();
        let d = Dispatcher::builder(HandlerTable::new())
            .macro_dir(dir.path())
            .build();

        let escape = d.dispatch(&command(
            "update_macro",
            json!({"macro_name": "../outside", "code": "x = 1"}),
        ));
        assert_eq!(escape.field("code").unwrap(), "INVALID_PARAM");
        assert!(!dir.path().parent().unwrap().join("outside.FCMacro").exists());

        let no_code = d.dispatch(&command("update_macro", json!({"macro_name": "plate"})));
        assert_eq!(no_code.field("code").unwrap(), "MISSING_PARAM");

        let bad_code = d.dispatch(&command(
            "update_macro",
            json!({"macro_name": "plate", "code": 7}),
        ));
        assert_eq!(bad_code.field("code").unwrap(), "INVALID_PARAM");

        let no_dir = dispatcher().dispatch(&command(
            "update_macro",
            json!({"macro_name": "plate", "code": "x = 1"}),
        ));
        assert_eq!(no_dir.field("code").unwrap(), "INVALID_PARAM");
    }

    #[test]
    fn get_report_returns_log_lines() {
        let report = ReportLog::new(10);
        report.push("first");
        report.push("second");
        let d = Dispatcher::builder(HandlerTable::new()).report(report).build();
        let response = d.dispatch(&command("get_report", json!({})));
        assert!(response.is_success());
        assert_eq!(response.field("report").unwrap(), "first\nsecond");
    }

    #[test]
    fn domain_handler_payload_becomes_response() {
        let response = dispatcher().dispatch(&command("list_documents", json!({})));
        assert!(response.is_success());
        assert_eq!(response.field("documents").unwrap(), &json!(["Bracket", "Gear"]));
    }

    #[test]
    fn unknown_command_suggests_close_match() {
        let response = dispatcher().dispatch(&command("list_document", json!({})));
        assert!(!response.is_success());
        assert_eq!(response.message.as_deref(), Some("Unknown command: list_document"));
        assert_eq!(response.field("code").unwrap(), "UNKNOWN_COMMAND");
        assert_eq!(
            response.field("suggested_fix").unwrap(),
            "Did you mean 'list_documents'?"
        );

        let response = dispatcher().dispatch(&command("frobnicate", json!({})));
        assert_eq!(response.message.as_deref(), Some("Unknown command: frobnicate"));
        assert!(response.field("suggested_fix").is_none());
    }

    #[test]
    fn handler_failure_carries_traceback() {
        let response = dispatcher().dispatch(&command("recompute", json!({})));
        assert!(!response.is_success());
        assert_eq!(response.message.as_deref(), Some("recompute failed"));
        assert_eq!(response.field("code").unwrap(), "INTERNAL");
        let trace = response.traceback.unwrap();
        assert!(trace.contains("Error in command 'recompute'"), "{trace}");
        assert!(trace.contains("solver diverged"), "{trace}");
    }

    #[test]
    fn handler_panic_is_contained() {
        let d = dispatcher();
        let response = d.dispatch(&command("crash", json!({})));
        assert!(!response.is_success());
        assert_eq!(response.field("code").unwrap(), "HANDLER_PANIC");
        assert!(response.message.unwrap().contains("segfault in kernel"));

        assert!(d.dispatch(&command("list_documents", json!({}))).is_success());
    }

    #[test]
    fn command_names_list_core_first() {
        let d = dispatcher();
        let names = d.command_names();
        assert_eq!(&names[..CORE_COMMANDS.len()], CORE_COMMANDS);
        assert!(names.contains(&"get_object"));
    }
}
