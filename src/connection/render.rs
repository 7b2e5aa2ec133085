//! Stats response rendering
//!
//! Output is written field by field into the session's response buffer:
//! an `ats` object holding the filtered record dump plus the server version,
//! and a `system` object when the record-type mask asks for it.

use bytes::{BufMut, BytesMut};
use std::fmt::Write;
use std::sync::Arc;

use super::system::SystemProbe;
use crate::metrics::{Record, RecordDump, RecordValue, ReloadCounters};
use crate::router::QueryFilter;
use crate::snapshot::RecordTypeMask;

/// Status line and headers sent ahead of every stats body
pub const RESPONSE_HEADER: &[u8] = b"HTTP/1.1 200 OK\r\n\
Content-Type: application/json\r\n\
Cache-Control: no-cache\r\n\r\n";

/// Everything a session needs to produce a stats body
pub struct Renderer {
    registry: Arc<dyn RecordDump>,
    probe: SystemProbe,
    counters: Arc<ReloadCounters>,
    server_version: String,
}

impl Renderer {
    pub fn new(
        registry: Arc<dyn RecordDump>,
        probe: SystemProbe,
        counters: Arc<ReloadCounters>,
        server_version: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            probe,
            counters,
            server_version: server_version.into(),
        }
    }

    /// Append the JSON body to `out`, returning the number of bytes added
    pub fn render(&self, out: &mut BytesMut, filter: &QueryFilter, mask: RecordTypeMask) -> usize {
        let start = out.len();

        let mut ats = JsonObject::open(out, "{ \"ats\": {\n");
        self.registry.dump(mask, &mut |record: &Record| {
            if filter.includes(&record.name) {
                ats.value(&record.name, &record.value);
            }
        });
        ats.string("server", &self.server_version);
        ats.close();

        if mask.includes_system() {
            let mut system = JsonObject::open(out, ",\n \"system\": {\n");
            self.append_system(&mut system, filter.interface());
            system.close();
        }

        out.put_slice(b"\n}\n");
        out.len() - start
    }

    fn append_system(&self, system: &mut JsonObject<'_>, interface: Option<&str>) {
        if let Some(interface) = interface {
            system.string("inf.name", interface);
            system.int("inf.speed", self.probe.interface_speed(interface));
            if let Some(line) = self.probe.net_dev_line(interface) {
                system.string("proc.net.dev", &line);
            }
        }
        if let Some(line) = self.probe.loadavg() {
            system.string("proc.loadavg", &line);
        }

        let reloads = self.counters.snapshot();
        system.uint("configReloadRequests", reloads.config_reload_requests);
        system.uint("lastReloadRequest", reloads.last_reload_request);
        system.uint("configReloads", reloads.config_reloads);
        system.uint("lastReload", reloads.last_reload);
        system.uint("astatsLoad", reloads.astats_load);
    }
}

/// Comma-separated `"name": value` lines inside one object
struct JsonObject<'a> {
    out: &'a mut BytesMut,
    empty: bool,
}

impl<'a> JsonObject<'a> {
    fn open(out: &'a mut BytesMut, opening: &str) -> Self {
        out.put_slice(opening.as_bytes());
        Self { out, empty: true }
    }

    fn key(&mut self, name: &str) {
        if !self.empty {
            self.out.put_slice(b",\n");
        }
        self.empty = false;
        self.out.put_slice(b"   ");
        put_json_string(self.out, name);
        self.out.put_slice(b": ");
    }

    fn value(&mut self, name: &str, value: &RecordValue) {
        match value {
            RecordValue::Counter(v) => self.uint(name, *v),
            // Rendered signed so negative ints do not wrap to 2^64 - n.
            RecordValue::Int(v) => self.int(name, *v),
            RecordValue::Float(v) => self.float(name, *v),
            RecordValue::String(v) => self.string(name, v),
        }
    }

    fn uint(&mut self, name: &str, value: u64) {
        self.key(name);
        let _ = write!(self.out, "{value}");
    }

    fn int(&mut self, name: &str, value: i64) {
        self.key(name);
        let _ = write!(self.out, "{value}");
    }

    fn float(&mut self, name: &str, value: f64) {
        self.key(name);
        if value.is_finite() {
            let _ = write!(self.out, "{value:.6}");
        } else {
            self.out.put_slice(b"null");
        }
    }

    fn string(&mut self, name: &str, value: &str) {
        self.key(name);
        put_json_string(self.out, value);
    }

    fn close(self) {
        self.out.put_slice(b"\n  }");
    }
}

fn put_json_string(out: &mut BytesMut, value: &str) {
    match serde_json::to_string(value) {
        Ok(quoted) => out.put_slice(quoted.as_bytes()),
        Err(_) => out.put_slice(b"\"\""),
    }
}
