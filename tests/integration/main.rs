//! Integration tests

mod config_reload;
mod http_intercept;
