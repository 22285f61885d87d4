#![warn(missing_docs)]

//! # macrogate-sandbox
//!
//! Validation and restricted execution of macro scripts for the macrogate
//! gateway.
//!
//! Macro code is a Python-flavoured script. It is parsed into a syntax tree,
//! checked against a [`SecurityPolicy`], and only then evaluated by an
//! in-crate interpreter that knows nothing beyond the bindings it is given.
//!
//! ## Security model
//!
//! - **Static validation**: imports, identifiers and attributes are checked
//!   against one process-wide policy before anything runs
//! - **Restricted interpreter**: no file, network, process or reflection
//!   primitives exist in the runtime at all
//! - **Explicit capabilities**: scripts see only the [`CapabilitySet`] plus
//!   their injected parameters
//! - **Fresh interpreter per call**: no state leaks between executions
//! - **Watchdog**: wall-clock, step, output, recursion and collection limits
//!
//! The validator alone is a syntactic filter, not an isolation boundary: an
//! allowed capability can still be misused through its own API.

pub mod audit;
pub mod capability;
mod error;
pub mod executor;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod runtime;
pub mod script;
pub mod validator;

pub use capability::{Capability, CapabilitySet, HostBridge};
pub use error::SandboxError;
pub use executor::{ExecutionOutput, SandboxConfig, SandboxExecutor};
pub use validator::{SecurityPolicy, ValidationResult, Violation};
