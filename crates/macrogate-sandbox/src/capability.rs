//! The capability set: named modules a macro script may reference.
//!
//! A [`CapabilitySet`] is built once at startup and shared by every
//! execution. It holds only `Send + Sync` descriptions; each execution turns
//! them into fresh module values on its own interpreter thread, so nothing a
//! script does to a module can leak into the next run.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use macrogate_error::DispatchError;
use serde_json::{Map, Value as Json};

use crate::runtime::math::{MathFn, MATH_CONSTANTS};
use crate::runtime::value::{Module, NativeFn, NativeKind, Value};

/// The bridge from sandboxed code back into the host's command table.
///
/// Scripts reach it through the host module's `call(command, params)`
/// function. Implementations decide which commands are reachable; the
/// gateway's bridge refuses its own code-execution commands.
pub trait HostBridge: Send + Sync {
    /// Host application name, exposed as `App.Name`.
    fn name(&self) -> &str;

    /// Host application version, exposed as `App.Version`.
    fn version(&self) -> &str;

    /// Run a host command and return its payload.
    fn call(&self, command: &str, params: &Map<String, Json>)
        -> Result<Map<String, Json>, DispatchError>;

    /// Names of the commands `call` accepts.
    fn commands(&self) -> Vec<String>;
}

/// One binding in a [`CapabilitySet`].
#[derive(Clone)]
pub enum Capability {
    /// The `math` module.
    Math,
    /// A host application handle.
    Host(Arc<dyn HostBridge>),
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Math => f.write_str("Math"),
            Capability::Host(bridge) => write!(f, "Host({} {})", bridge.name(), bridge.version()),
        }
    }
}

/// Ordered map of binding name to capability.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    bindings: BTreeMap<String, Capability>,
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.bindings.iter()).finish()
    }
}

impl CapabilitySet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding only `math`.
    pub fn standard() -> Self {
        Self::new().with_math()
    }

    /// Bind the `math` module.
    pub fn with_math(mut self) -> Self {
        self.insert("math", Capability::Math);
        self
    }

    /// Bind a host handle under each alias.
    pub fn with_host<I, S>(mut self, aliases: I, bridge: Arc<dyn HostBridge>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for alias in aliases {
            self.insert(alias, Capability::Host(bridge.clone()));
        }
        self
    }

    /// Add or replace a binding.
    pub fn insert(&mut self, name: impl Into<String>, capability: Capability) {
        self.bindings.insert(name.into(), capability);
    }

    /// Look up a binding.
    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.bindings.get(name)
    }

    /// Whether `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Binding names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// Bindings in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Capability)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Build the module value for one binding.
pub(crate) fn instantiate(name: &str, capability: &Capability) -> Value {
    let mut attrs = BTreeMap::new();
    match capability {
        Capability::Math => {
            for (constant, value) in MATH_CONSTANTS {
                attrs.insert(constant.to_string(), Value::Float(value));
            }
            for function in MathFn::ALL {
                attrs.insert(
                    function.name().to_string(),
                    native(name, function.name(), NativeKind::Math(function)),
                );
            }
        }
        Capability::Host(bridge) => {
            attrs.insert("Name".into(), Value::str(bridge.name()));
            attrs.insert("Version".into(), Value::str(bridge.version()));
            attrs.insert(
                "call".into(),
                native(name, "call", NativeKind::HostCall(bridge.clone())),
            );
            attrs.insert(
                "commands".into(),
                native(name, "commands", NativeKind::HostCommands(bridge.clone())),
            );
        }
    }
    Value::Module(Rc::new(Module {
        name: name.to_string(),
        attrs,
    }))
}

fn native(module: &str, name: &'static str, kind: NativeKind) -> Value {
    Value::Native(Rc::new(NativeFn {
        module: module.to_string(),
        name,
        kind,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub;

    impl HostBridge for Stub {
        fn name(&self) -> &str {
            "StubCAD"
        }
        fn version(&self) -> &str {
            "1.0"
        }
        fn call(&self, _: &str, _: &Map<String, Json>) -> Result<Map<String, Json>, DispatchError> {
            Ok(Map::new())
        }
        fn commands(&self) -> Vec<String> {
            vec!["create_box".into()]
        }
    }

    #[test]
    fn host_aliases_share_one_bridge() {
        let set = CapabilitySet::standard().with_host(["App", "FreeCAD"], Arc::new(Stub));
        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, ["App", "FreeCAD", "math"]);
        assert!(matches!(set.get("App"), Some(Capability::Host(_))));
        assert!(!set.contains("numpy"));
    }

    #[test]
    fn math_module_exposes_functions_and_constants() {
        let Value::Module(module) = instantiate("math", &Capability::Math) else {
            panic!("expected module");
        };
        assert!(matches!(module.attrs.get("sqrt"), Some(Value::Native(_))));
        assert!(matches!(module.attrs.get("pi"), Some(Value::Float(_))));
        assert!(!module.attrs.contains_key("system"));
    }

    #[test]
    fn host_module_attributes() {
        let Value::Module(module) = instantiate("App", &Capability::Host(Arc::new(Stub))) else {
            panic!("expected module");
        };
        assert_eq!(module.attrs.get("Name").map(Value::to_str).as_deref(), Some("StubCAD"));
        assert!(matches!(module.attrs.get("call"), Some(Value::Native(_))));
    }

    #[test]
    fn debug_lists_bindings() {
        let set = CapabilitySet::standard();
        assert_eq!(format!("{set:?}"), "{\"math\": Math}");
    }

    #[test]
    fn capability_set_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CapabilitySet>();
    }
}
