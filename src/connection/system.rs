//! Host state for the synthetic `system` section

use std::path::{Path, PathBuf};

/// Reads interface and load information from sysfs/procfs
#[derive(Debug, Clone)]
pub struct SystemProbe {
    sys_class_net: PathBuf,
    proc_dir: PathBuf,
}

impl SystemProbe {
    pub fn new(sys_class_net: impl Into<PathBuf>, proc_dir: impl Into<PathBuf>) -> Self {
        Self {
            sys_class_net: sys_class_net.into(),
            proc_dir: proc_dir.into(),
        }
    }

    /// Link speed of `interface` in Mb/s
    ///
    /// Zero unless the interface reports `up` and a numeric speed.
    pub fn interface_speed(&self, interface: &str) -> i64 {
        if !is_safe_interface_name(interface) {
            return 0;
        }
        let dir = self.sys_class_net.join(interface);

        match read_file(&dir.join("operstate")) {
            Some(state) if state.trim() == "up" => read_file(&dir.join("speed"))
                .and_then(|speed| speed.trim().parse().ok())
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// The `/proc/net/dev` counter line for `interface`
    pub fn net_dev_line(&self, interface: &str) -> Option<String> {
        if interface.is_empty() {
            return None;
        }
        let text = read_file(&self.proc_dir.join("net/dev"))?;
        text.lines()
            .map(str::trim_start)
            .find(|line| {
                line.strip_prefix(interface)
                    .is_some_and(|rest| rest.starts_with(':'))
            })
            .map(str::to_string)
    }

    /// First line of `/proc/loadavg`
    pub fn loadavg(&self) -> Option<String> {
        let text = read_file(&self.proc_dir.join("loadavg"))?;
        text.lines().next().map(str::to_string)
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new("/sys/class/net", "/proc")
    }
}

fn read_file(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

/// Interface names come from the query string; keep them inside sysfs.
fn is_safe_interface_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\0'])
}
