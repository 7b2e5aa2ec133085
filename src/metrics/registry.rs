//! Named record registry
//!
//! Records are classified into record types by name prefix and dumped in
//! name order through [`RecordDump`].

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::snapshot::{ConfigSnapshot, RecordTypeMask};

/// Value of a single record
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    Counter(u64),
    Int(i64),
    Float(f64),
    String(String),
}

/// One record visited during a dump
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: String,
    pub record_type: RecordTypeMask,
    pub value: RecordValue,
}

/// Source of records for the stats response
pub trait RecordDump: Send + Sync {
    /// Visit every record whose type is selected by `mask`
    fn dump(&self, mask: RecordTypeMask, visit: &mut dyn FnMut(&Record));
}

/// Record type implied by a record name
pub fn record_type_for(name: &str) -> RecordTypeMask {
    if name.starts_with("proxy.config.") {
        RecordTypeMask::CONFIG
    } else if name.starts_with("proxy.node.") {
        RecordTypeMask::NODE
    } else if name.starts_with("plugin.") {
        RecordTypeMask::PLUGIN
    } else {
        RecordTypeMask::PROCESS
    }
}

enum Slot {
    Counter(Arc<AtomicU64>),
    /// f64 bits, as written by the `metrics` gauge handle
    Gauge(Arc<AtomicU64>),
    Int(Arc<AtomicI64>),
    Text(Arc<RwLock<String>>),
}

impl Slot {
    fn value(&self) -> RecordValue {
        match self {
            Slot::Counter(v) => RecordValue::Counter(v.load(Ordering::Relaxed)),
            Slot::Gauge(v) => RecordValue::Float(f64::from_bits(v.load(Ordering::Relaxed))),
            Slot::Int(v) => RecordValue::Int(v.load(Ordering::Relaxed)),
            Slot::Text(v) => RecordValue::String(v.read().clone()),
        }
    }
}

struct Entry {
    record_type: RecordTypeMask,
    slot: Slot,
}

/// Concurrent record registry
#[derive(Default)]
pub struct Registry {
    records: DashMap<String, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a counter record
    pub fn counter(&self, name: &str) -> Arc<AtomicU64> {
        let entry = self
            .records
            .entry(name.to_string())
            .or_insert_with(|| new_entry(name, Slot::Counter(Arc::default())));
        match &entry.slot {
            Slot::Counter(v) => Arc::clone(v),
            _ => {
                warn!(name, "Record already registered with another kind, updates are dropped");
                Arc::default()
            }
        }
    }

    /// Get or create a float gauge record
    pub fn gauge(&self, name: &str) -> Arc<AtomicU64> {
        let entry = self
            .records
            .entry(name.to_string())
            .or_insert_with(|| new_entry(name, Slot::Gauge(Arc::default())));
        match &entry.slot {
            Slot::Gauge(v) => Arc::clone(v),
            _ => {
                warn!(name, "Record already registered with another kind, updates are dropped");
                Arc::default()
            }
        }
    }

    /// Set an integer record
    pub fn set_int(&self, name: &str, value: i64) {
        let entry = self
            .records
            .entry(name.to_string())
            .or_insert_with(|| new_entry(name, Slot::Int(Arc::default())));
        if let Slot::Int(v) = &entry.slot {
            v.store(value, Ordering::Relaxed);
        }
    }

    /// Set a string record
    pub fn set_string(&self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let entry = self
            .records
            .entry(name.to_string())
            .or_insert_with(|| new_entry(name, Slot::Text(Arc::default())));
        if let Slot::Text(v) = &entry.slot {
            *v.write() = value;
        }
    }

    /// Publish the active stats configuration as config records
    pub fn publish_config(&self, snapshot: &ConfigSnapshot) {
        self.set_string("proxy.config.astats.path", snapshot.stats_path());
        self.set_int(
            "proxy.config.astats.record_types",
            i64::from(snapshot.record_types().bits()),
        );
        self.set_int(
            "proxy.config.astats.allow_ip_count",
            snapshot.allow_v4().len() as i64,
        );
        self.set_int(
            "proxy.config.astats.allow_ip6_count",
            snapshot.allow_v6().len() as i64,
        );
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn new_entry(name: &str, slot: Slot) -> Entry {
    Entry {
        record_type: record_type_for(name),
        slot,
    }
}

impl RecordDump for Registry {
    fn dump(&self, mask: RecordTypeMask, visit: &mut dyn FnMut(&Record)) {
        // Copy out first so no shard lock is held while visiting.
        let mut records: Vec<Record> = self
            .records
            .iter()
            .filter(|e| mask.intersects(e.record_type))
            .map(|e| Record {
                name: e.key().clone(),
                record_type: e.record_type,
                value: e.slot.value(),
            })
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));

        for record in &records {
            visit(record);
        }
    }
}
