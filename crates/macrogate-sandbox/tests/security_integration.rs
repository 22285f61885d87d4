//! Security integration tests for the macro sandbox.
//!
//! These drive the full validate-then-run pipeline through
//! [`SandboxExecutor`], with a stub host bridge standing in for the
//! gateway's handler table.

use std::sync::{Arc, Mutex};

use macrogate_error::DispatchError;
use macrogate_sandbox::{
    CapabilitySet, HostBridge, SandboxConfig, SandboxError, SandboxExecutor, SecurityPolicy,
    Violation,
};
use serde_json::{json, Map, Value};

/// Records every call and answers `get_object` with a canned payload.
#[derive(Default)]
struct StubHost {
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl HostBridge for StubHost {
    fn name(&self) -> &str {
        "FreeCAD"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn call(
        &self,
        command: &str,
        params: &Map<String, Value>,
    ) -> Result<Map<String, Value>, DispatchError> {
        self.calls
            .lock()
            .unwrap()
            .push((command.to_string(), params.clone()));
        match command {
            "get_object" => {
                let mut payload = Map::new();
                payload.insert("result".into(), json!("success"));
                payload.insert("label".into(), params.get("name").cloned().unwrap_or(Value::Null));
                payload.insert("volume".into(), json!(1000.0));
                Ok(payload)
            }
            _ => Err(DispatchError::UnknownCommand(command.to_string())),
        }
    }

    fn commands(&self) -> Vec<String> {
        vec!["get_object".into(), "list_documents".into()]
    }
}

fn executor_with(host: Arc<StubHost>) -> SandboxExecutor {
    let capabilities = CapabilitySet::standard().with_host(["App", "FreeCAD"], host);
    SandboxExecutor::new(
        SandboxConfig::default(),
        Arc::new(SecurityPolicy::default()),
        Arc::new(capabilities),
    )
}

fn violations(code: &str) -> Vec<Violation> {
    match executor_with(Arc::default()).execute(code, &Map::new()) {
        Err(SandboxError::ValidationFailed { violations }) => violations,
        other => panic!("expected validation failure for {code:?}, got {other:?}"),
    }
}

#[test]
fn host_calls_reach_the_bridge() {
    let host = Arc::new(StubHost::default());
    let exec = executor_with(host.clone());
    let code = "\
import FreeCAD
obj = FreeCAD.call('get_object', {'name': name})
result = {'label': obj['label'], 'volume': obj['volume'], 'app': App.Name}
";
    let mut params = Map::new();
    params.insert("name".into(), json!("Box"));
    let out = exec.execute(code, &params).unwrap();
    assert_eq!(
        out.value,
        Some(json!({"label": "Box", "volume": 1000.0, "app": "FreeCAD"}))
    );

    let calls = host.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "get_object");
    assert_eq!(calls[0].1["name"], "Box");
}

#[test]
fn host_failures_raise_catchable_host_error() {
    let exec = executor_with(Arc::default());
    let code = "\
try:
    App.call('frobnicate')
except HostError as e:
    result = str(e)
";
    let out = exec.execute(code, &Map::new()).unwrap();
    assert_eq!(out.value, Some(json!("Unknown command: frobnicate")));
}

#[test]
fn host_commands_are_listed() {
    let out = executor_with(Arc::default())
        .execute("result = App.commands()", &Map::new())
        .unwrap();
    assert_eq!(out.value, Some(json!(["get_object", "list_documents"])));
}

#[test]
fn allowed_but_absent_module_fails_at_run_time() {
    match executor_with(Arc::default()).execute("import numpy", &Map::new()) {
        Err(SandboxError::Script { kind, .. }) => assert_eq!(kind, "ImportError"),
        other => panic!("expected ImportError, got {other:?}"),
    }
}

#[test]
fn denied_names_are_found_in_nested_code() {
    let cases = [
        "f = lambda: eval('1')",
        "def g(x=open):\n    pass",
        "items = [exec for _ in range(3)]",
        "data = {k: globals() for k in 'ab'}",
        "print(f'{getattr(App, \"Name\")}')",
        "try:\n    pass\nexcept Exception as vars:\n    pass",
        "for compile in range(2):\n    pass",
    ];
    for code in cases {
        assert!(!violations(code).is_empty(), "{code:?} should be rejected");
    }
}

#[test]
fn denied_call_reports_both_forms() {
    let found = violations("eval('1 + 1')");
    assert!(found
        .iter()
        .any(|v| matches!(v, Violation::DeniedCall { name, .. } if name == "eval")));
    assert!(found
        .iter()
        .any(|v| matches!(v, Violation::DeniedIdentifier { name, .. } if name == "eval")));
}

#[test]
fn dunder_attribute_escape_is_blocked() {
    let found = violations("x = ().__class__.__bases__[0].__subclasses__()");
    let attrs: Vec<&str> = found
        .iter()
        .filter_map(|v| match v {
            Violation::DeniedAttribute { attr, .. } => Some(attr.as_str()),
            _ => None,
        })
        .collect();
    for attr in ["__class__", "__bases__", "__subclasses__"] {
        assert!(attrs.contains(&attr), "{attr} missing from {attrs:?}");
    }
    assert_eq!(attrs.len(), 3);
}

#[test]
fn from_import_of_disallowed_module() {
    let found = violations("from subprocess import run");
    assert!(matches!(
        &found[0],
        Violation::DisallowedImport { module, from_import: true, .. } if module == "subprocess"
    ));
    assert!(found[0].to_string().starts_with("Importing from module 'subprocess'"));
}

#[test]
fn syntax_errors_are_unsafe() {
    let found = violations("class Foo:\n    pass");
    assert!(matches!(found[0], Violation::SyntaxError { line: 1, .. }));
}

#[test]
fn deep_nesting_is_refused_before_parsing() {
    let code = format!("x = {}1{}", "(".repeat(500), ")".repeat(500));
    let found = violations(&code);
    assert!(matches!(found[0], Violation::NestingTooDeep { max: 100, .. }));
}

#[test]
fn output_of_failed_script_is_kept() {
    match executor_with(Arc::default()).execute("print('before')\nraise ValueError('nope')", &Map::new()) {
        Err(err @ SandboxError::Script { .. }) => {
            assert_eq!(err.partial_output(), Some("before\n"));
            assert_eq!(err.to_string(), "ValueError: nope");
        }
        other => panic!("unexpected {other:?}"),
    }
}
