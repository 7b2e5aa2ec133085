//! `metrics` facade backed by the record registry
//!
//! Lets the server record its own operational metrics with the usual
//! `counter!`/`gauge!` macros; those records then show up in the stats
//! response like any other.

use anyhow::{anyhow, Result};
use metrics::{
    describe_counter, describe_gauge, Counter, Gauge, Histogram, Key, KeyName, Metadata,
    Recorder, SharedString, Unit,
};
use std::sync::Arc;

use super::counters::{
    CONNECTIONS_ACCEPTED, REQUESTS_DENIED, REQUESTS_INTERCEPTED, REQUESTS_PASSED_THROUGH,
    RESPONSE_BYTES, SESSIONS_ACTIVE, SESSION_ERRORS,
};
use super::registry::Registry;

/// Recorder writing straight into a [`Registry`]
#[derive(Clone)]
pub struct RegistryRecorder {
    registry: Arc<Registry>,
}

impl RegistryRecorder {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

impl Recorder for RegistryRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(self.registry.counter(key.name()))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(self.registry.gauge(key.name()))
    }

    fn register_histogram(&self, _key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        // Distributions have no record kind to dump into.
        Histogram::noop()
    }
}

/// Install the registry as the global metrics recorder
pub fn init_metrics(registry: Arc<Registry>) -> Result<()> {
    metrics::set_global_recorder(RegistryRecorder::new(registry))
        .map_err(|_| anyhow!("a global metrics recorder is already installed"))?;

    describe_counter!(CONNECTIONS_ACCEPTED, "Total connections accepted");
    describe_counter!(REQUESTS_INTERCEPTED, "Requests served by the stats session");
    describe_counter!(REQUESTS_PASSED_THROUGH, "Requests left to normal handling");
    describe_counter!(REQUESTS_DENIED, "Stats requests refused by the allow-lists");
    describe_counter!(RESPONSE_BYTES, "Total stats response bytes written");
    describe_counter!(SESSION_ERRORS, "Stats sessions torn down on error");
    describe_gauge!(SESSIONS_ACTIVE, "Stats sessions in flight");

    Ok(())
}
