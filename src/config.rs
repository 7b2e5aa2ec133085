//! Configuration management
//!
//! Handles loading and validating server configuration from TOML files.
//! The hot-reloadable stats directives live in a separate file, see
//! [`crate::snapshot`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pool::DEFAULT_BUFFER_SIZE;
use crate::snapshot::{resolve_config_path, DEFAULT_GRACE_PERIOD};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener
    pub bind_addr: SocketAddr,
    /// Number of worker threads (0 = auto)
    #[serde(default)]
    pub workers: usize,
    /// Upper bound on the request head
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
    /// Time allowed for the request head to arrive
    #[serde(default = "default_header_timeout")]
    pub header_timeout_secs: u64,
}

impl ServerConfig {
    /// Get effective worker count (auto-detect if 0)
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }

    pub fn header_timeout(&self) -> Duration {
        Duration::from_secs(self.header_timeout_secs)
    }
}

/// Stats directive file settings
#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    /// Explicit directive file; relative paths resolve inside `config_dir`
    #[serde(default)]
    pub config_path: Option<PathBuf>,
    /// Directory holding the directive file
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
    /// How long a replaced snapshot is kept alive
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Fail startup when the directive file cannot be read
    #[serde(default = "default_true")]
    pub require_config_file: bool,
}

impl StatsConfig {
    /// Directive file location after resolving against `config_dir`
    pub fn resolved_path(&self) -> PathBuf {
        resolve_config_path(self.config_path.as_deref(), &self.config_dir)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            config_dir: default_config_dir(),
            grace_period_ms: default_grace_period_ms(),
            require_config_file: true,
        }
    }
}

/// Roots for the synthetic `system` section
#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_sys_class_net")]
    pub sys_class_net: PathBuf,
    #[serde(default = "default_proc_dir")]
    pub proc_dir: PathBuf,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            sys_class_net: default_sys_class_net(),
            proc_dir: default_proc_dir(),
        }
    }
}

/// Memory pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Number of pre-allocated session buffers
    #[serde(default = "default_buffer_count")]
    pub buffer_count: usize,
    /// Capacity of each buffer
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            buffer_count: default_buffer_count(),
            buffer_size: default_buffer_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_max_request_bytes() -> usize { 8192 }
fn default_header_timeout() -> u64 { 10 }
fn default_config_dir() -> PathBuf { PathBuf::from("/etc/trafficserver") }
fn default_grace_period_ms() -> u64 { DEFAULT_GRACE_PERIOD.as_millis() as u64 }
fn default_true() -> bool { true }
fn default_sys_class_net() -> PathBuf { PathBuf::from("/sys/class/net") }
fn default_proc_dir() -> PathBuf { PathBuf::from("/proc") }
fn default_buffer_count() -> usize { 256 }
fn default_buffer_size() -> usize { DEFAULT_BUFFER_SIZE }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_toml(&contents)?;
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.server.max_request_bytes < 64 {
            anyhow::bail!("max_request_bytes must be >= 64");
        }
        if self.server.header_timeout_secs == 0 {
            anyhow::bail!("header_timeout_secs must be > 0");
        }
        if self.pool.buffer_size == 0 {
            anyhow::bail!("buffer_size must be > 0");
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            anyhow::bail!("logging.format must be \"json\" or \"pretty\"");
        }
        Ok(())
    }
}
