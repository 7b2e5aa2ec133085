//! Stats configuration
//!
//! Immutable snapshots, the lock-free store that publishes them, and the
//! loader that builds them from the config file.

mod loader;
mod store;
mod types;

pub use loader::{
    parse_config, resolve_config_path, ConfigError, ConfigHolder, DirectiveError, LoadOutcome,
    DEFAULT_CONFIG_NAME,
};
pub use store::{ConfigStore, DEFAULT_GRACE_PERIOD};
pub use types::{ConfigSnapshot, RecordTypeMask, DEFAULT_PATH};
