//! astats server - server statistics as JSON over HTTP
//!
//! Intercepts a single configured path, checks the client against CIDR
//! allow-lists and answers with a JSON dump of the record registry. The
//! stats directives are hot-reloadable without blocking request handling.

pub mod config;
pub mod connection;
pub mod metrics;
pub mod pool;
pub mod router;
pub mod server;
pub mod snapshot;
pub mod util;

pub use config::Config;
pub use server::Server;

/// Server version for display
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
