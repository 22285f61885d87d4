//! The table of external domain handlers.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use macrogate_error::DispatchError;
use serde_json::{Map, Value};

/// A domain handler: parameter mapping in, payload mapping out.
pub type HandlerFn =
    Box<dyn Fn(&Map<String, Value>) -> Result<Map<String, Value>, DispatchError> + Send + Sync>;

/// Command name to handler, matched by exact string.
#[derive(Default)]
pub struct HandlerTable {
    handlers: BTreeMap<String, HandlerFn>,
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("commands", &self.names())
            .finish()
    }
}

impl HandlerTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any earlier one.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&Map<String, Value>) -> Result<Map<String, Value>, DispatchError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        if self.handlers.insert(name.clone(), Box::new(handler)).is_some() {
            tracing::warn!(command = %name, "handler replaced");
        }
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<Map<String, Value>, DispatchError>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, handler);
        self
    }

    /// Whether a handler is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handler for `command`.
    ///
    /// A panic inside the handler is caught and returned as
    /// [`DispatchError::Panicked`].
    pub fn call(
        &self,
        command: &str,
        params: &Map<String, Value>,
    ) -> Result<Map<String, Value>, DispatchError> {
        let handler = self
            .handlers
            .get(command)
            .ok_or_else(|| DispatchError::UnknownCommand(command.to_string()))?;

        match catch_unwind(AssertUnwindSafe(|| handler(params))) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(command, %message, "handler panicked");
                Err(DispatchError::Panicked {
                    command: command.to_string(),
                    message,
                })
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> HandlerTable {
        HandlerTable::new()
            .with("list_documents", |_| {
                let mut out = Map::new();
                out.insert("documents".into(), json!(["Bracket"]));
                Ok(out)
            })
            .with("fail", |_| {
                Err(DispatchError::Handler {
                    command: "fail".into(),
                    message: "no active document".into(),
                })
            })
            .with("explode", |_| panic!("kaboom"))
    }

    #[test]
    fn calls_registered_handler() {
        let out = table().call("list_documents", &Map::new()).unwrap();
        assert_eq!(out["documents"], json!(["Bracket"]));
    }

    #[test]
    fn unknown_command_is_typed() {
        let err = table().call("frobnicate", &Map::new()).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownCommand(ref name) if name == "frobnicate"));
    }

    #[test]
    fn handler_error_passes_through() {
        let err = table().call("fail", &Map::new()).unwrap_err();
        assert_eq!(err.to_string(), "no active document");
    }

    #[test]
    fn panic_becomes_error() {
        let err = table().call("explode", &Map::new()).unwrap_err();
        match err {
            DispatchError::Panicked { command, message } => {
                assert_eq!(command, "explode");
                assert_eq!(message, "kaboom");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn names_are_sorted() {
        let table = table();
        assert_eq!(table.names(), vec!["explode", "fail", "list_documents"]);
        assert_eq!(table.len(), 3);
        assert!(table.contains("fail"));
        assert!(!HandlerTable::new().contains("fail"));
    }
}
