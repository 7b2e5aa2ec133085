//! Metrics and observability
//!
//! The record registry dumped by stats sessions, the `metrics` recorder that
//! feeds it, and the process-wide reload counters.

mod counters;
mod exporter;
mod registry;

pub use counters::*;
pub use exporter::{init_metrics, RegistryRecorder};
pub use registry::{record_type_for, Record, RecordDump, RecordValue, Registry};
