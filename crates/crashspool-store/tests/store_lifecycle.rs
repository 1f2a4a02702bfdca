//! Integration tests: quota eviction and retention sweeps against a real
//! spool directory.

use std::fs::{self, File};
use std::io::Cursor;
use std::path::Path;
use std::time::{Duration, SystemTime};

use crashspool_core::domain::OwnerId;
use crashspool_store::{ReportStore, StoreLimits, UPLOAD_LOG_FILENAME};

const SIZE_LIMIT: u64 = 1024 * 1024;

fn limits() -> StoreLimits {
    StoreLimits {
        max_per_owner: 10,
        max_total: 20,
        max_groups_to_keep: 10,
        max_age: Duration::from_secs(30 * 24 * 60 * 60),
    }
}

fn ingest_one(store: &ReportStore, owner: u32) -> crashspool_store::Report {
    store
        .ingest(
            &mut Cursor::new(b"MDMP-payload".to_vec()),
            OwnerId::new(owner),
            SIZE_LIMIT,
        )
        .unwrap()
}

fn owned_count(store: &ReportStore, owner: u32) -> usize {
    store
        .list_reports()
        .unwrap()
        .iter()
        .filter(|r| r.name().owner() == Some(OwnerId::new(owner)))
        .count()
}

/// Backdate a file's modification time by `age`.
fn set_age(path: &Path, age: Duration) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

#[test]
fn ingesting_under_the_cap_keeps_every_report() {
    // Scenario A: 3 reports for owner 5 with a per-owner cap of 10.
    let dir = tempfile::tempdir().unwrap();
    let store = ReportStore::new(dir.path().to_path_buf(), limits());

    for _ in 0..3 {
        ingest_one(&store, 5);
    }

    assert_eq!(owned_count(&store, 5), 3);
}

#[test]
fn per_owner_cap_evicts_the_owners_oldest_report() {
    // Scenario B: owner 5 is at its cap of 10; the 11th ingestion evicts
    // the oldest of the original 10 and keeps the new report.
    let dir = tempfile::tempdir().unwrap();
    let store = ReportStore::new(dir.path().to_path_buf(), limits());

    let mut originals = Vec::new();
    for i in 0..10 {
        let report = ingest_one(&store, 5);
        // Spread modification times so "oldest" is unambiguous.
        set_age(report.path(), Duration::from_secs(1000 - i * 10));
        originals.push(report);
    }
    let oldest = originals[0].path().to_path_buf();

    let newest = ingest_one(&store, 5);

    assert_eq!(owned_count(&store, 5), 10);
    assert!(!oldest.exists(), "the oldest original should be evicted");
    assert!(newest.path().exists());
}

#[test]
fn per_owner_cap_does_not_evict_other_owners() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReportStore::new(dir.path().to_path_buf(), limits());

    let other = ingest_one(&store, 7);
    set_age(other.path(), Duration::from_secs(10_000));

    for _ in 0..11 {
        ingest_one(&store, 5);
    }

    // Owner 7's (much older) report survives; owner 5 paid its own quota.
    assert_eq!(owned_count(&store, 7), 1);
    assert_eq!(owned_count(&store, 5), 10);
}

#[test]
fn global_cap_evicts_the_oldest_report_across_owners() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReportStore::new(
        dir.path().to_path_buf(),
        StoreLimits {
            max_per_owner: 4,
            max_total: 6,
            ..limits()
        },
    );

    let mut age = 1000;
    let first = ingest_one(&store, 1);
    set_age(first.path(), Duration::from_secs(age));
    for owner in [1, 2, 2, 3, 3] {
        age -= 100;
        let report = ingest_one(&store, owner);
        set_age(report.path(), Duration::from_secs(age));
    }
    assert_eq!(store.list_reports().unwrap().len(), 6);

    ingest_one(&store, 4);

    let reports = store.list_reports().unwrap();
    assert_eq!(reports.len(), 6);
    assert!(!first.path().exists(), "globally oldest report is evicted");
}

#[test]
fn uploaded_reports_never_count_toward_quota() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReportStore::new(
        dir.path().to_path_buf(),
        StoreLimits {
            max_per_owner: 2,
            max_total: 4,
            ..limits()
        },
    );

    let uploaded = ingest_one(&store, 5);
    let uploaded = store.mark_uploaded(&uploaded).unwrap();

    ingest_one(&store, 5);
    ingest_one(&store, 5);

    // Two pending reports at the cap; the terminal report was not evicted
    // and did not trigger eviction of a pending one.
    assert!(uploaded.path().exists());
    assert_eq!(owned_count(&store, 5), 3);
}

#[test]
fn uploaded_report_is_never_selected_again() {
    // Scenario E: a report that succeeds is terminal.
    let dir = tempfile::tempdir().unwrap();
    let store = ReportStore::new(dir.path().to_path_buf(), limits());

    let report = ingest_one(&store, 5);
    let local_id = report.local_id().to_string();
    store.mark_uploaded(&report).unwrap();

    assert!(store.list_eligible(3).unwrap().is_empty());
    assert!(store.lookup_by_local_id(&local_id).unwrap().is_none());
}

#[test]
fn purge_deletes_uploaded_and_temporary_unconditionally() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReportStore::new(dir.path().to_path_buf(), limits());

    let keep = ingest_one(&store, 5);
    let done = ingest_one(&store, 5);
    store.mark_uploaded(&done).unwrap();
    fs::write(dir.path().join("leftover.tmp"), b"partial").unwrap();

    let stats = store.purge().unwrap();

    assert_eq!(stats.uploaded_deleted, 1);
    assert_eq!(stats.temporary_deleted, 1);
    assert!(keep.path().exists());
}

#[test]
fn purge_deletes_reports_older_than_max_age() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReportStore::new(
        dir.path().to_path_buf(),
        StoreLimits {
            max_age: Duration::from_secs(60),
            ..limits()
        },
    );

    let stale = ingest_one(&store, 5);
    set_age(stale.path(), Duration::from_secs(120));
    let fresh = ingest_one(&store, 5);

    let stats = store.purge().unwrap();

    assert_eq!(stats.expired_deleted, 1);
    assert!(!stale.path().exists());
    assert!(fresh.path().exists());
}

#[test]
fn purge_keeps_only_the_most_recent_groups() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReportStore::new(
        dir.path().to_path_buf(),
        StoreLimits {
            max_groups_to_keep: 2,
            // Quota caps high enough to stay out of the way.
            max_per_owner: 100,
            max_total: 100,
            ..limits()
        },
    );

    // Three groups; "old" is the least recently modified. Its sidecar
    // (same base, different generation) must be purged along with it.
    for (name, age) in [
        ("old.dmp0", 300),
        ("old.dmp1", 300),
        ("mid.dmp0", 200),
        ("new.dmp0", 100),
    ] {
        let path = dir.path().join(name);
        fs::write(&path, b"MDMP").unwrap();
        set_age(&path, Duration::from_secs(age));
    }

    let stats = store.purge().unwrap();

    assert_eq!(stats.over_cap_deleted, 2);
    assert!(!dir.path().join("old.dmp0").exists());
    assert!(!dir.path().join("old.dmp1").exists());
    assert!(dir.path().join("mid.dmp0").exists());
    assert!(dir.path().join("new.dmp0").exists());
}

#[test]
fn purge_never_touches_the_upload_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReportStore::new(
        dir.path().to_path_buf(),
        StoreLimits {
            max_age: Duration::from_secs(1),
            max_groups_to_keep: 0,
            ..limits()
        },
    );

    let log = store.upload_log();
    log.append("local-1", "remote-1").unwrap();
    set_age(log.path(), Duration::from_secs(10_000));

    let report = ingest_one(&store, 5);
    set_age(report.path(), Duration::from_secs(10_000));

    store.purge().unwrap();

    assert!(log.path().exists(), "{UPLOAD_LOG_FILENAME} must survive");
    assert_eq!(log.entries().unwrap().len(), 1);
    assert!(!report.path().exists());
}
