//! The host bridge sandboxed scripts use to reach the handler table.

use std::sync::{Arc, Mutex};

use macrogate_error::DispatchError;
use macrogate_sandbox::HostBridge;
use serde_json::{Map, Value};

use crate::dispatcher::CORE_COMMANDS;
use crate::handler::HandlerTable;

/// How the host handle presents itself to scripts.
#[derive(Debug, Clone)]
pub struct HostIdentity {
    /// `App.Name`.
    pub name: String,
    /// `App.Version`.
    pub version: String,
    /// Global names the handle is bound to.
    pub aliases: Vec<String>,
}

impl Default for HostIdentity {
    fn default() -> Self {
        Self {
            name: "macrogate".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            aliases: vec!["App".into(), "FreeCAD".into()],
        }
    }
}

/// [`HostBridge`] over the domain handler table.
///
/// Core commands are refused: a script cannot start another script. A
/// command whose handler is still running cannot be entered again.
pub struct HandlerBridge {
    handlers: Arc<HandlerTable>,
    name: String,
    version: String,
    active: Mutex<Vec<String>>,
}

impl HandlerBridge {
    /// Bridge to `handlers`, presenting as `identity`.
    pub fn new(handlers: Arc<HandlerTable>, identity: &HostIdentity) -> Self {
        Self {
            handlers,
            name: identity.name.clone(),
            version: identity.version.clone(),
            active: Mutex::new(Vec::new()),
        }
    }

    fn enter(&self, command: &str) -> Result<ActiveCall<'_>, DispatchError> {
        let mut active = match self.active.lock() {
            Ok(active) => active,
            Err(poisoned) => poisoned.into_inner(),
        };
        if active.iter().any(|c| c == command) {
            return Err(DispatchError::Reentrant(command.to_string()));
        }
        active.push(command.to_string());
        Ok(ActiveCall {
            bridge: self,
            command: command.to_string(),
        })
    }
}

struct ActiveCall<'a> {
    bridge: &'a HandlerBridge,
    command: String,
}

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        let mut active = match self.bridge.active.lock() {
            Ok(active) => active,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(pos) = active.iter().rposition(|c| *c == self.command) {
            active.remove(pos);
        }
    }
}

impl HostBridge for HandlerBridge {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn call(
        &self,
        command: &str,
        params: &Map<String, Value>,
    ) -> Result<Map<String, Value>, DispatchError> {
        if CORE_COMMANDS.contains(&command) {
            tracing::warn!(command, "script tried to invoke a core command");
            return Err(DispatchError::Reentrant(command.to_string()));
        }
        let _active = self.enter(command)?;
        tracing::debug!(command, "host call");
        self.handlers.call(command, params)
    }

    fn commands(&self) -> Vec<String> {
        self.handlers.names().into_iter().map(String::from).collect()
    }
}
