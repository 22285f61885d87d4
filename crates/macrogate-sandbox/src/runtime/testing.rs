use std::time::Duration;

use serde_json::Map;

use super::interp::{run, Limits, RunFailure, RunOutput};
use crate::capability::CapabilitySet;
use crate::script::parse;

fn run_script(code: &str) -> Result<RunOutput, RunFailure> {
    let code = code.to_string();
    std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(move || {
            let program = parse(&code).expect("parse");
            let limits = Limits {
                timeout: Duration::from_secs(5),
                max_steps: None,
                max_output: 1 << 20,
                max_recursion: 100,
                max_collection_len: 1_000_000,
            };
            run(&program, &Map::new(), &CapabilitySet::standard(), &limits)
        })
        .expect("spawn")
        .join()
        .expect("join")
}

/// Captured output of a script that must succeed.
pub(crate) fn output_of(code: &str) -> String {
    match run_script(code) {
        Ok(out) => out.output,
        Err(err) => panic!("script failed: {err:?}"),
    }
}

/// `(exception type, message)` of a script that must raise.
pub(crate) fn error_of(code: &str) -> (String, String) {
    match run_script(code) {
        Err(RunFailure::Script { kind, message, .. }) => (kind.to_string(), message),
        other => panic!("expected a script exception, got {other:?}"),
    }
}
