//! Stats config file parsing and reload
//!
//! The file is line oriented:
//!
//! ```text
//! # comment
//! path=_astats
//! record_types=122
//! allow_ip=127.0.0.1,10.0.0.0/8
//! allow_ip6=::1 fd00::/8
//! ```
//!
//! `path=` and `record_types=` keep their last value, `allow_ip=` and
//! `allow_ip6=` accumulate. Any malformed directive fails the whole load and
//! leaves the published snapshot in place.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::{ConfigSnapshot, ConfigStore, RecordTypeMask, DEFAULT_PATH};
use crate::metrics::ReloadCounters;
use crate::router::{CidrError, CidrV4, CidrV6};

/// File name looked up in the config directory when no path is given
pub const DEFAULT_CONFIG_NAME: &str = "astats.config";

const PATH_FIELD: &str = "path=";
const RECORD_FIELD: &str = "record_types=";
const IP_FIELD: &str = "allow_ip=";
const IP6_FIELD: &str = "allow_ip6=";

const LIST_SEPARATORS: &[char] = &[',', ' ', '\t', '\r', '\n'];

/// Why a single directive was rejected
#[derive(Debug, Error)]
pub enum DirectiveError {
    #[error("must have a value")]
    EmptyValue,
    #[error("value '{0}' is not a hexadecimal integer")]
    InvalidHex(String),
    #[error("value '{0}' out of range")]
    OutOfRange(String),
    #[error(transparent)]
    Cidr(#[from] CidrError),
}

/// Config load failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration file - line {line}: '{field}' {source}")]
    Parse {
        line: usize,
        field: &'static str,
        #[source]
        source: DirectiveError,
    },
    #[error("could not read configuration file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a load that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A new snapshot was published
    Reloaded,
    /// The file has not changed since the last load
    Unchanged,
    /// The file could not be read; the previous snapshot stays active
    Retained,
}

/// Parse config text into a snapshot
pub fn parse_config(text: &str) -> Result<ConfigSnapshot, ConfigError> {
    let mut stats_path: Option<String> = None;
    let mut record_types = RecordTypeMask::DEFAULT;
    let mut allow_v4 = Vec::new();
    let mut allow_v6 = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim_start();
        if line.starts_with('#') {
            continue;
        }

        if let Some(value) = line.strip_prefix(PATH_FIELD) {
            let path = parse_path(value).map_err(|e| parse_error(line_no, PATH_FIELD, e))?;
            if stats_path.is_some() {
                debug!(line = line_no, "multiple 'path=' in config file");
            }
            stats_path = Some(path);
        } else if let Some(value) = line.strip_prefix(RECORD_FIELD) {
            record_types =
                parse_record_types(value).map_err(|e| parse_error(line_no, RECORD_FIELD, e))?;
        } else if let Some(value) = line.strip_prefix(IP_FIELD) {
            parse_list(value, CidrV4::parse, &mut allow_v4)
                .map_err(|e| parse_error(line_no, IP_FIELD, e))?;
        } else if let Some(value) = line.strip_prefix(IP6_FIELD) {
            parse_list(value, CidrV6::parse, &mut allow_v6)
                .map_err(|e| parse_error(line_no, IP6_FIELD, e))?;
        } else if !line.trim().is_empty() {
            debug!(line = line_no, "Ignoring unrecognized config line");
        }
    }

    if allow_v4.is_empty() {
        debug!("No allow_ip entries, allowing IPv4 loopback only");
    }
    if allow_v6.is_empty() {
        debug!("No allow_ip6 entries, allowing IPv6 loopback only");
    }

    let snapshot = ConfigSnapshot::new(
        stats_path.unwrap_or_else(|| DEFAULT_PATH.to_string()),
        record_types,
        allow_v4,
        allow_v6,
    );
    debug!(path = snapshot.stats_path(), "Parsed config");
    Ok(snapshot)
}

fn parse_error(line: usize, field: &'static str, source: DirectiveError) -> ConfigError {
    ConfigError::Parse {
        line,
        field: field.trim_end_matches('='),
        source,
    }
}

fn first_token(value: &str) -> Option<&str> {
    value.split_whitespace().next()
}

fn parse_path(value: &str) -> Result<String, DirectiveError> {
    first_token(value)
        .map(str::to_string)
        .ok_or(DirectiveError::EmptyValue)
}

fn parse_record_types(value: &str) -> Result<RecordTypeMask, DirectiveError> {
    let token = first_token(value).ok_or(DirectiveError::EmptyValue)?;
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DirectiveError::InvalidHex(token.to_string()));
    }

    let bits = u32::from_str_radix(digits, 16)
        .map_err(|_| DirectiveError::OutOfRange(token.to_string()))?;
    if bits & !RecordTypeMask::KNOWN.bits() != 0 {
        return Err(DirectiveError::OutOfRange(token.to_string()));
    }

    Ok(RecordTypeMask::from_bits(bits))
}

fn parse_list<T>(
    value: &str,
    parse: fn(&str) -> Result<T, CidrError>,
    out: &mut Vec<T>,
) -> Result<(), DirectiveError> {
    for entry in value.split(LIST_SEPARATORS).filter(|s| !s.is_empty()) {
        out.push(parse(entry)?);
    }
    Ok(())
}

/// Resolve the config file location
///
/// Relative paths are taken inside `config_dir`.
pub fn resolve_config_path(explicit: Option<&Path>, config_dir: &Path) -> PathBuf {
    match explicit {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => config_dir.join(path),
        None => config_dir.join(DEFAULT_CONFIG_NAME),
    }
}

/// Owns the config file identity and the published snapshot
pub struct ConfigHolder {
    path: PathBuf,
    store: ConfigStore,
    /// File modification time as of the last successful load
    last_load: Mutex<Option<SystemTime>>,
    counters: Arc<ReloadCounters>,
}

impl ConfigHolder {
    /// Load `path` for the first time; any failure is fatal
    pub fn open(
        path: impl Into<PathBuf>,
        grace_period: Duration,
        counters: Arc<ReloadCounters>,
    ) -> Result<Self, ConfigError> {
        let path = path.into();
        let requested_at = counters.reload_requested();

        let (snapshot, mtime) = read_snapshot(&path).map_err(|e| {
            error!(path = ?path, error = %e, "Initial config load failed");
            e
        })?;
        counters.reload_succeeded(requested_at);
        info!(
            path = ?path,
            stats_path = snapshot.stats_path(),
            record_types = %snapshot.record_types(),
            "Loaded config"
        );

        Ok(Self {
            path,
            store: ConfigStore::new(snapshot, grace_period),
            last_load: Mutex::new(mtime),
            counters,
        })
    }

    /// Like [`open`](Self::open), but a missing or unreadable file starts
    /// from the built-in defaults
    pub fn open_or_default(
        path: impl Into<PathBuf>,
        grace_period: Duration,
        counters: Arc<ReloadCounters>,
    ) -> Result<Self, ConfigError> {
        let path = path.into();
        match Self::open(path.clone(), grace_period, counters.clone()) {
            Err(ConfigError::Io { source, .. }) => {
                warn!(path = ?path, error = %source, "No config, using defaults");
                Ok(Self {
                    path,
                    store: ConfigStore::new(ConfigSnapshot::default(), grace_period),
                    last_load: Mutex::new(None),
                    counters,
                })
            }
            other => other,
        }
    }

    /// Re-read the file if it changed and publish the result
    ///
    /// Parse errors fail the load; unreadable files keep the current
    /// snapshot. Either way the published snapshot is untouched on failure.
    pub fn reload(&self) -> Result<LoadOutcome, ConfigError> {
        let requested_at = self.counters.reload_requested();
        let mut last_load = self.last_load.lock();

        let mtime = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.modified().ok(),
            Err(e) => {
                error!(path = ?self.path, error = %e, "Could not stat configuration file");
                return Ok(LoadOutcome::Retained);
            }
        };

        if let (Some(mtime), Some(previous)) = (mtime, *last_load) {
            if mtime <= previous {
                debug!(path = ?self.path, "Config unchanged since last load");
                return Ok(LoadOutcome::Unchanged);
            }
        }

        let (snapshot, mtime) = match read_snapshot(&self.path) {
            Ok(loaded) => loaded,
            Err(ConfigError::Io { source, .. }) => {
                error!(path = ?self.path, error = %source, "Unable to open config");
                return Ok(LoadOutcome::Retained);
            }
            Err(e) => {
                error!(path = ?self.path, error = %e, "Config reload failed, keeping previous config");
                return Err(e);
            }
        };

        info!(
            path = ?self.path,
            stats_path = snapshot.stats_path(),
            record_types = %snapshot.record_types(),
            allow_ip = snapshot.allow_v4().len(),
            allow_ip6 = snapshot.allow_v6().len(),
            "Reloaded config"
        );
        self.store.publish(snapshot);
        *last_load = mtime;
        self.counters.reload_succeeded(requested_at);

        Ok(LoadOutcome::Reloaded)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn counters(&self) -> &Arc<ReloadCounters> {
        &self.counters
    }
}

/// Read and parse the directive file along with its mtime
///
/// Invalid UTF-8 is replaced, not rejected: it can only sit in comments or in
/// values that then fail to parse on their own.
fn read_snapshot(path: &Path) -> Result<(ConfigSnapshot, Option<SystemTime>), ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mtime = std::fs::metadata(path).map_err(io_error)?.modified().ok();
    let bytes = std::fs::read(path).map_err(io_error)?;
    debug!(path = ?path, "Opening config file");

    Ok((parse_config(&String::from_utf8_lossy(&bytes))?, mtime))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let snapshot = parse_config("").unwrap();
        assert_eq!(snapshot, ConfigSnapshot::default());
    }

    #[test]
    fn test_full_file() {
        let text = "\
# stats endpoint
path=_stats
record_types=0x102
allow_ip=10.0.0.0/8, 192.168.1.1
allow_ip=172.16.0.0/12
allow_ip6=fd00::/8 ::1
";
        let snapshot = parse_config(text).unwrap();
        assert_eq!(snapshot.stats_path(), "_stats");
        assert_eq!(snapshot.record_types(), RecordTypeMask::from_bits(0x102));

        let v4: Vec<String> = snapshot.allow_v4().iter().map(|c| c.to_string()).collect();
        assert_eq!(v4, ["10.0.0.0/8", "192.168.1.1/32", "172.16.0.0/12"]);

        let v6: Vec<String> = snapshot.allow_v6().iter().map(|c| c.to_string()).collect();
        assert_eq!(v6, ["fd00::/8", "::1/128"]);
    }

    #[test]
    fn test_last_path_wins() {
        let snapshot = parse_config("path=one\npath=two extra\n").unwrap();
        assert_eq!(snapshot.stats_path(), "two");
    }

    #[test]
    fn test_comments_are_skipped() {
        let snapshot = parse_config("#path=hidden\n#allow_ip=bogus\n").unwrap();
        assert_eq!(snapshot.stats_path(), DEFAULT_PATH);
    }

    #[test]
    fn test_v6_only_list_keeps_v4_default() {
        let snapshot = parse_config("allow_ip6=2001:db8::/32\n").unwrap();
        assert_eq!(snapshot.allow_v4().len(), 1);
        assert_eq!(snapshot.allow_v4()[0].to_string(), "127.0.0.1/32");
        assert_eq!(snapshot.allow_v6()[0].to_string(), "2001:db8::/32");
    }

    #[test]
    fn test_empty_path_is_fatal() {
        let err = parse_config("allow_ip=10.0.0.1\npath=\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Parse {
                line: 2,
                field: "path",
                source: DirectiveError::EmptyValue,
            }
        ));
    }

    #[test]
    fn test_bad_record_types_are_fatal() {
        assert!(matches!(
            parse_config("record_types=ZZ\n"),
            Err(ConfigError::Parse {
                source: DirectiveError::InvalidHex(_),
                ..
            })
        ));
        assert!(matches!(
            parse_config("record_types=\n"),
            Err(ConfigError::Parse {
                source: DirectiveError::EmptyValue,
                ..
            })
        ));
        assert!(matches!(
            parse_config("record_types=1ffffffff\n"),
            Err(ConfigError::Parse {
                source: DirectiveError::OutOfRange(_),
                ..
            })
        ));
        assert!(matches!(
            parse_config("record_types=200\n"),
            Err(ConfigError::Parse {
                source: DirectiveError::OutOfRange(_),
                ..
            })
        ));
    }

    #[test]
    fn test_bad_ip_entry_is_fatal() {
        let err = parse_config("allow_ip=10.0.0.1, 10.0.0.300\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Parse {
                line: 1,
                field: "allow_ip",
                source: DirectiveError::Cidr(CidrError::InvalidAddress(_)),
            }
        ));

        let err = parse_config("allow_ip6=::1/200\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Parse {
                field: "allow_ip6",
                source: DirectiveError::Cidr(CidrError::PrefixTooLong { .. }),
                ..
            }
        ));
    }

    #[test]
    fn test_error_message_names_line_and_field() {
        let err = parse_config("\n\nrecord_types=nothex\n").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("line 3"), "{message}");
        assert!(message.contains("record_types"), "{message}");
    }

    #[test]
    fn test_resolve_config_path() {
        let dir = Path::new("/etc/trafficserver");
        assert_eq!(
            resolve_config_path(None, dir),
            PathBuf::from("/etc/trafficserver/astats.config")
        );
        assert_eq!(
            resolve_config_path(Some(Path::new("/tmp/x.config")), dir),
            PathBuf::from("/tmp/x.config")
        );
        assert_eq!(
            resolve_config_path(Some(Path::new("x.config")), dir),
            PathBuf::from("/etc/trafficserver/x.config")
        );
    }
}
