//! Lock-free holder for the active configuration
//!
//! Readers load the current snapshot without blocking. Publishing swaps
//! the pointer in one step and hands the superseded snapshot to a
//! deferred release task instead of dropping it in place.
//!
//! The grace period is an assumption, not a proven bound: it is expected
//! to outlast any single request that captured the old snapshot just
//! before the swap. Because snapshots are reference counted, a reader that
//! outlives the grace period still keeps its snapshot alive; the grace
//! period only delays when the store gives up its own reference.

use arc_swap::{ArcSwap, Guard};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::ConfigSnapshot;

/// Default delay before a superseded snapshot is released
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(300_000);

/// Shared, atomically replaceable [`ConfigSnapshot`]
#[derive(Clone)]
pub struct ConfigStore {
    current: Arc<ArcSwap<ConfigSnapshot>>,
    grace_period: Duration,
}

impl ConfigStore {
    /// Create a store holding `initial`
    pub fn new(initial: ConfigSnapshot, grace_period: Duration) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(initial)),
            grace_period,
        }
    }

    /// Borrow the current snapshot for the duration of one operation
    #[inline]
    pub fn load(&self) -> Guard<Arc<ConfigSnapshot>> {
        self.current.load()
    }

    /// Take an owned reference to the current snapshot
    pub fn load_full(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Install `next` and schedule release of the previous snapshot
    pub fn publish(&self, next: ConfigSnapshot) {
        let next = Arc::new(next);
        let previous = self.current.swap(Arc::clone(&next));
        debug!(
            old = ?Arc::as_ptr(&previous),
            new = ?Arc::as_ptr(&next),
            "Scheduling release of superseded config"
        );
        self.retire(previous);
    }

    fn retire(&self, previous: Arc<ConfigSnapshot>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let grace_period = self.grace_period;
                handle.spawn(async move {
                    tokio::time::sleep(grace_period).await;
                    debug!(
                        remaining_readers = Arc::strong_count(&previous) - 1,
                        "Releasing superseded config"
                    );
                    drop(previous);
                });
            }
            Err(_) => {
                // Outstanding readers still hold their own references.
                debug!("No runtime available, releasing superseded config reference now");
                drop(previous);
            }
        }
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("current", &**self.current.load())
            .field("grace_period", &self.grace_period)
            .finish()
    }
}
