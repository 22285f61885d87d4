#![warn(missing_docs)]

//! # macrogate-server
//!
//! The socket-facing half of the macrogate gateway.
//!
//! [`ServerState`] owns a non-blocking listener and every open connection.
//! A host calls [`ServerState::tick`] on a fixed interval (or lets
//! [`ServerState::serve`] do it); each tick accepts at most one connection,
//! reads whatever is available, and hands complete requests to a
//! [`RequestHandler`]. Each connection carries exactly one request: once the
//! response is written the server closes it.
//!
//! [`Dispatcher`] is the production handler. It answers the core commands
//! (`execute_code`, `validate_macro_code`, `run_macro`, `get_report`) and
//! routes every other type tag to a [`HandlerTable`] of domain handlers,
//! which sandboxed scripts can also reach through the host handle.
//!
//! ```no_run
//! use macrogate_server::{Dispatcher, HandlerTable, ServerConfig, ServerState};
//!
//! let dispatcher = Dispatcher::builder(HandlerTable::new()).build();
//! let mut server = ServerState::start(ServerConfig::default(), dispatcher)?;
//! loop {
//!     server.tick();
//!     std::thread::sleep(server.config().tick_interval);
//! }
//! # Ok::<(), macrogate_server::ServerError>(())
//! ```

pub mod bridge;
pub mod config;
mod connection;
pub mod dispatcher;
mod error;
pub mod handler;
pub mod macros;
pub mod report;
mod state;

pub use bridge::{HandlerBridge, HostIdentity};
pub use config::ServerConfig;
pub use dispatcher::{Dispatcher, DispatcherBuilder, CORE_COMMANDS};
pub use error::ServerError;
pub use handler::{HandlerFn, HandlerTable};
pub use report::{ReportLayer, ReportLog};
pub use state::{RequestHandler, ServerState, TickStats};
