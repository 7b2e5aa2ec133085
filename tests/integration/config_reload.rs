//! Stats config reload integration tests

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use astats_server::metrics::ReloadCounters;
use astats_server::router::{CidrV4, CidrV6};
use astats_server::snapshot::{ConfigError, ConfigHolder, LoadOutcome, RecordTypeMask};

const GRACE: Duration = Duration::from_millis(10);

fn write_config(path: &Path, text: &str, mtime: SystemTime) {
    write_config_bytes(path, text.as_bytes(), mtime);
}

fn write_config_bytes(path: &Path, bytes: &[u8], mtime: SystemTime) {
    fs::write(path, bytes).unwrap();
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(mtime)
        .unwrap();
}

fn base_time() -> SystemTime {
    SystemTime::now() - Duration::from_secs(3600)
}

#[test]
fn test_missing_allow_lists_default_to_loopback() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("astats.config");
    write_config(&path, "path=stats\n", base_time());

    let holder = ConfigHolder::open(&path, GRACE, Arc::new(ReloadCounters::new())).unwrap();
    let snapshot = holder.store().load_full();

    assert_eq!(snapshot.stats_path(), "stats");
    assert_eq!(snapshot.allow_v4(), ["127.0.0.1/32".parse::<CidrV4>().unwrap()]);
    assert_eq!(snapshot.allow_v6(), ["::1/128".parse::<CidrV6>().unwrap()]);
}

#[test]
fn test_unchanged_file_is_not_reparsed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("astats.config");
    write_config(&path, "path=_astats\nallow_ip=10.0.0.0/8\n", base_time());

    let counters = Arc::new(ReloadCounters::new());
    let holder = ConfigHolder::open(&path, GRACE, counters.clone()).unwrap();
    let before = holder.store().load_full();

    assert_eq!(holder.reload().unwrap(), LoadOutcome::Unchanged);
    assert_eq!(holder.reload().unwrap(), LoadOutcome::Unchanged);

    let after = holder.store().load_full();
    assert!(Arc::ptr_eq(&before, &after));

    let snap = counters.snapshot();
    assert_eq!(snap.config_reload_requests, 3);
    assert_eq!(snap.config_reloads, 1);
}

#[test]
fn test_modified_file_reloads_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("astats.config");
    let t0 = base_time();
    write_config(&path, "path=_astats\n", t0);

    let counters = Arc::new(ReloadCounters::new());
    let holder = ConfigHolder::open(&path, GRACE, counters.clone()).unwrap();
    assert_eq!(counters.snapshot().config_reloads, 1);

    write_config(
        &path,
        "path=metrics\nrecord_types=0x2\nallow_ip=192.168.0.0/16\n",
        t0 + Duration::from_secs(10),
    );

    assert_eq!(holder.reload().unwrap(), LoadOutcome::Reloaded);
    assert_eq!(holder.reload().unwrap(), LoadOutcome::Unchanged);
    assert_eq!(counters.snapshot().config_reloads, 2);

    let snapshot = holder.store().load_full();
    assert_eq!(snapshot.stats_path(), "metrics");
    assert_eq!(snapshot.record_types(), RecordTypeMask::PROCESS);
    assert_eq!(snapshot.allow_v4().len(), 1);
}

#[test]
fn test_latin1_comment_does_not_block_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("astats.config");
    let t0 = base_time();
    write_config(&path, "path=_astats\n", t0);

    let counters = Arc::new(ReloadCounters::new());
    let holder = ConfigHolder::open(&path, GRACE, counters.clone()).unwrap();

    let edited: &[u8] = b"# caf\xe9 edge\npath=newpath\nallow_ip=10.0.0.0/8\n";
    write_config_bytes(&path, edited, t0 + Duration::from_secs(10));

    assert_eq!(holder.reload().unwrap(), LoadOutcome::Reloaded);
    assert_eq!(counters.snapshot().config_reloads, 2);

    let snapshot = holder.store().load_full();
    assert_eq!(snapshot.stats_path(), "newpath");
    assert_eq!(snapshot.allow_v4(), ["10.0.0.0/8".parse::<CidrV4>().unwrap()]);

    // Startup reads the same bytes instead of falling back to defaults.
    let fresh =
        ConfigHolder::open_or_default(&path, GRACE, Arc::new(ReloadCounters::new())).unwrap();
    assert_eq!(fresh.store().load().stats_path(), "newpath");
}

#[test]
fn test_bad_record_types_keep_previous_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("astats.config");
    let t0 = base_time();
    write_config(&path, "path=_astats\n", t0);

    let counters = Arc::new(ReloadCounters::new());
    let holder = ConfigHolder::open(&path, GRACE, counters.clone()).unwrap();
    let before = holder.store().load_full();

    write_config(&path, "path=other\nrecord_types=ZZ\n", t0 + Duration::from_secs(10));

    match holder.reload() {
        Err(ConfigError::Parse { line, field, .. }) => {
            assert_eq!(line, 2);
            assert_eq!(field, "record_types");
        }
        other => panic!("expected parse error, got {other:?}"),
    }

    assert!(Arc::ptr_eq(&before, &holder.store().load_full()));
    let snap = counters.snapshot();
    assert_eq!(snap.config_reload_requests, 2);
    assert_eq!(snap.config_reloads, 1);
}

#[test]
fn test_vanished_file_retains_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("astats.config");
    write_config(&path, "path=_astats\n", base_time());

    let holder = ConfigHolder::open(&path, GRACE, Arc::new(ReloadCounters::new())).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(holder.reload().unwrap(), LoadOutcome::Retained);
    assert_eq!(holder.store().load().stats_path(), "_astats");
}

#[test]
fn test_first_load_failures() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.config");

    assert!(matches!(
        ConfigHolder::open(&missing, GRACE, Arc::new(ReloadCounters::new())),
        Err(ConfigError::Io { .. })
    ));

    let holder =
        ConfigHolder::open_or_default(&missing, GRACE, Arc::new(ReloadCounters::new())).unwrap();
    assert_eq!(holder.store().load().stats_path(), "_astats");
    assert_eq!(holder.store().load().record_types(), RecordTypeMask::DEFAULT);

    let bad = dir.path().join("bad.config");
    write_config(&bad, "allow_ip=not-an-address\n", base_time());
    assert!(matches!(
        ConfigHolder::open_or_default(&bad, GRACE, Arc::new(ReloadCounters::new())),
        Err(ConfigError::Parse { .. })
    ));
}
