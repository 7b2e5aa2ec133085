//! Server implementation
//!
//! HTTP listener and per-connection handling.

mod acceptor;
mod listener;

pub use acceptor::{parse_request_line, ConnectionHandler, RequestLine};
pub use listener::Server;
