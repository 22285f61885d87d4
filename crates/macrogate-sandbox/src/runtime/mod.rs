//! The restricted interpreter that runs validated macro scripts.
//!
//! Values are reference counted and single-threaded, so a whole run happens
//! on one thread. [`interp::run`] is the entry point; the executor wraps it
//! with validation, parameter binding and auditing.

pub mod builtins;
pub mod exception;
pub mod format;
pub mod interp;
pub mod math;
pub mod methods;
mod ops;
pub mod value;

#[cfg(test)]
mod testing;

pub use interp::{run, Limits, RunFailure, RunOutput};
