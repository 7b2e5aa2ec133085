//! Process-wide reload counters and server metric names
//!
//! Lock-free scalars; fields are updated independently, so a reader may see
//! a request count that is ahead of the matching success count.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Counters shared by the running process
pub static RELOAD_COUNTERS: Lazy<Arc<ReloadCounters>> =
    Lazy::new(|| Arc::new(ReloadCounters::new()));

// Records published by the server itself through the `metrics` facade.
pub const CONNECTIONS_ACCEPTED: &str = "proxy.process.astats.connections_accepted";
pub const REQUESTS_INTERCEPTED: &str = "proxy.process.astats.requests_intercepted";
pub const REQUESTS_PASSED_THROUGH: &str = "proxy.process.astats.requests_passed_through";
pub const REQUESTS_DENIED: &str = "proxy.process.astats.requests_denied";
pub const RESPONSE_BYTES: &str = "proxy.process.astats.response_bytes";
pub const SESSION_ERRORS: &str = "proxy.process.astats.session_errors";
pub const SESSIONS_ACTIVE: &str = "proxy.process.astats.sessions_active";

/// Config reload bookkeeping
pub struct ReloadCounters {
    config_reload_requests: AtomicU64,
    last_reload_request: AtomicU64,
    config_reloads: AtomicU64,
    last_reload: AtomicU64,
    astats_load: AtomicU64,
}

impl ReloadCounters {
    pub const fn new() -> Self {
        Self {
            config_reload_requests: AtomicU64::new(0),
            last_reload_request: AtomicU64::new(0),
            config_reloads: AtomicU64::new(0),
            last_reload: AtomicU64::new(0),
            astats_load: AtomicU64::new(0),
        }
    }

    /// Record process start
    pub fn mark_started(&self) {
        self.astats_load.store(unix_now(), Ordering::Relaxed);
    }

    /// Record a load attempt, returning its timestamp
    #[inline]
    pub fn reload_requested(&self) -> u64 {
        let now = unix_now();
        self.config_reload_requests.fetch_add(1, Ordering::Relaxed);
        self.last_reload_request.store(now, Ordering::Relaxed);
        now
    }

    /// Record a load that published a new snapshot
    #[inline]
    pub fn reload_succeeded(&self, requested_at: u64) {
        self.config_reloads.fetch_add(1, Ordering::Relaxed);
        self.last_reload.store(requested_at, Ordering::Relaxed);
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> ReloadSnapshot {
        ReloadSnapshot {
            config_reload_requests: self.config_reload_requests.load(Ordering::Relaxed),
            last_reload_request: self.last_reload_request.load(Ordering::Relaxed),
            config_reloads: self.config_reloads.load(Ordering::Relaxed),
            last_reload: self.last_reload.load(Ordering::Relaxed),
            astats_load: self.astats_load.load(Ordering::Relaxed),
        }
    }
}

impl Default for ReloadCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of reload counters for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReloadSnapshot {
    pub config_reload_requests: u64,
    pub last_reload_request: u64,
    pub config_reloads: u64,
    pub last_reload: u64,
    pub astats_load: u64,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
