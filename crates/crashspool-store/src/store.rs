//! The report spool directory
//!
//! [`ReportStore`] owns a single directory of crash reports whose lifecycle
//! state is encoded in their file names. Every state transition is one
//! atomic rename; if a rename fails the source report is deleted rather
//! than retried, so no report is ever stuck between states.
//!
//! Quota enforcement happens inside the ingest critical section: the
//! eviction decision and the acceptance of the new report are covered by
//! one mutex, so two concurrent ingestions cannot both conclude they are
//! under quota.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crashspool_core::config::StoreConfig;
use crashspool_core::domain::{DomainError, OwnerId, ReportName, ReportState};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::upload_log::{UploadLog, UPLOAD_LOG_FILENAME};

/// Buffer size for the bounded ingestion copy
const COPY_BUFFER_BYTES: usize = 8192;

/// A report on disk: its path plus the parsed form of its name
#[derive(Debug, Clone)]
pub struct Report {
    path: PathBuf,
    name: ReportName,
    modified: SystemTime,
}

impl Report {
    /// Full path of the report file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parsed name: identity and lifecycle state
    #[must_use]
    pub fn name(&self) -> &ReportName {
        &self.name
    }

    /// Last modification time, used for eviction and retention ordering
    #[must_use]
    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// The report's stable local id (its base name)
    #[must_use]
    pub fn local_id(&self) -> &str {
        self.name.base()
    }
}

/// Quota and retention limits, usually derived from [`StoreConfig`]
#[derive(Debug, Clone)]
pub struct StoreLimits {
    /// Per-owner cap on non-terminal reports
    pub max_per_owner: usize,
    /// Global cap on non-terminal reports
    pub max_total: usize,
    /// Distinct report groups `purge` keeps
    pub max_groups_to_keep: usize,
    /// Reports older than this are deleted by `purge`
    pub max_age: Duration,
}

impl From<&StoreConfig> for StoreLimits {
    fn from(config: &StoreConfig) -> Self {
        Self {
            max_per_owner: config.max_reports_per_owner,
            max_total: config.max_reports_total,
            max_groups_to_keep: config.max_groups_to_keep,
            max_age: config.max_age(),
        }
    }
}

/// Counts of files removed by one `purge` sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    /// Uploaded (terminal) reports deleted unconditionally
    pub uploaded_deleted: usize,
    /// Leftover ingestion temporaries deleted unconditionally
    pub temporary_deleted: usize,
    /// Reports deleted for exceeding the maximum age
    pub expired_deleted: usize,
    /// Reports deleted for exceeding the group-count cap
    pub over_cap_deleted: usize,
}

impl PurgeStats {
    /// Total files deleted by the sweep
    #[must_use]
    pub fn total(&self) -> usize {
        self.uploaded_deleted + self.temporary_deleted + self.expired_deleted + self.over_cap_deleted
    }
}

/// Manages the crash report spool directory
pub struct ReportStore {
    dir: PathBuf,
    limits: StoreLimits,
    /// Serializes quota evaluation with acceptance of new reports
    ingest_lock: Mutex<()>,
}

impl ReportStore {
    /// Creates a store for `dir` with the given limits.
    ///
    /// The directory is not created until [`ensure_directory`] or the first
    /// ingestion.
    ///
    /// [`ensure_directory`]: ReportStore::ensure_directory
    #[must_use]
    pub fn new(dir: PathBuf, limits: StoreLimits) -> Self {
        Self {
            dir,
            limits,
            ingest_lock: Mutex::new(()),
        }
    }

    /// The spool directory path
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Handle to the upload manifest inside this spool
    #[must_use]
    pub fn upload_log(&self) -> UploadLog {
        UploadLog::new(self.dir.join(UPLOAD_LOG_FILENAME))
    }

    /// Create the spool directory unless it already exists.
    ///
    /// Fails if the path exists as a non-directory.
    pub fn ensure_directory(&self) -> Result<(), StoreError> {
        if self.dir.exists() && !self.dir.is_dir() {
            return Err(StoreError::NotADirectory {
                path: self.dir.clone(),
            });
        }
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Copy at most `size_limit` bytes from `source` into a new pending
    /// report owned by `owner`.
    ///
    /// The bytes land in a temporary file first; quotas are enforced (per
    /// owner, then globally, evicting the oldest offending report) and the
    /// temporary is atomically renamed into its pending name. A source
    /// longer than `size_limit` aborts the ingestion with
    /// [`StoreError::TooLarge`] and leaves nothing behind.
    pub fn ingest(
        &self,
        source: &mut dyn Read,
        owner: OwnerId,
        size_limit: u64,
    ) -> Result<Report, StoreError> {
        self.ensure_directory()?;
        let _guard = self.ingest_lock.lock().unwrap_or_else(|e| e.into_inner());

        let tmp_path = self.dir.join(ReportName::temporary().file_name());
        if let Err(e) = copy_bounded(source, &tmp_path, size_limit) {
            if let Err(del) = fs::remove_file(&tmp_path) {
                debug!(path = %tmp_path.display(), error = %del, "No temporary to clean up");
            }
            return Err(e);
        }

        self.enforce_quotas(owner)?;

        let name = ReportName::fresh(owner);
        let path = self.dir.join(name.file_name());
        if let Err(e) = fs::rename(&tmp_path, &path) {
            warn!(error = %e, "Failed to promote temporary into pending report");
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::Io(e));
        }

        info!(owner = %owner, report = %name, "Ingested crash report");
        Ok(Report {
            path,
            name,
            modified: SystemTime::now(),
        })
    }

    /// All parsed reports in the spool, newest-modified first.
    ///
    /// Ties are broken by path order so the result is a total order. Files
    /// that do not match the naming grammar (including the upload manifest)
    /// are not reports and are never returned.
    pub fn list_reports(&self) -> Result<Vec<Report>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e)),
        };

        let mut reports = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(name) = ReportName::parse(file_name) else {
                continue;
            };
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            reports.push(Report {
                path: entry.path(),
                name,
                modified,
            });
        }

        reports.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(reports)
    }

    /// Reports currently eligible for automatic upload, newest first.
    ///
    /// Pending reports pass only while their attempt count is below
    /// `max_tries`; forced reports always pass.
    pub fn list_eligible(&self, max_tries: u32) -> Result<Vec<Report>, StoreError> {
        Ok(self
            .list_reports()?
            .into_iter()
            .filter(|report| match report.name().state() {
                ReportState::Pending { attempts } => *attempts < max_tries,
                ReportState::Forced { .. } => true,
                _ => false,
            })
            .collect())
    }

    /// Find a non-terminal report by local id.
    ///
    /// Uploaded reports are never matched; the first match in
    /// newest-modified order wins.
    pub fn lookup_by_local_id(&self, local_id: &str) -> Result<Option<Report>, StoreError> {
        Ok(self.list_reports()?.into_iter().find(|report| {
            matches!(
                report.name().state(),
                ReportState::Pending { .. }
                    | ReportState::Skipped { .. }
                    | ReportState::Forced { .. }
            ) && report.name().matches_local_id(local_id)
        }))
    }

    /// Rename a report to its uploaded (terminal) marker.
    ///
    /// Applying this to an already-uploaded report is a logged no-op.
    pub fn mark_uploaded(&self, report: &Report) -> Result<Report, StoreError> {
        if report.name().state().is_terminal() {
            warn!(report = %report.name(), "Report already uploaded, leaving it untouched");
            return Ok(report.clone());
        }
        let target = report.name().to_uploaded()?;
        self.apply_transition(report, target)
    }

    /// Rename a report to its skipped marker, preserving its attempt count.
    pub fn mark_skipped(&self, report: &Report) -> Result<Report, StoreError> {
        let target = report.name().to_skipped()?;
        self.apply_transition(report, target)
    }

    /// Look up a report by local id and rename it to the forced marker with
    /// its attempt count reset to 0.
    ///
    /// Fails with an illegal-transition error if the only match was already
    /// uploaded, and with [`StoreError::NotFound`] if nothing matches.
    pub fn mark_forced(&self, local_id: &str) -> Result<Report, StoreError> {
        if let Some(report) = self.lookup_by_local_id(local_id)? {
            let target = report.name().to_forced()?;
            let forced = self.apply_transition(&report, target)?;
            info!(report = %forced.name(), "Report marked for forced upload");
            return Ok(forced);
        }

        let already_uploaded = self.list_reports()?.into_iter().any(|report| {
            report.name().state().is_terminal() && report.name().matches_local_id(local_id)
        });
        if already_uploaded {
            warn!(local_id, "Refusing to force an already-uploaded report");
            return Err(StoreError::Transition(DomainError::IllegalTransition {
                from: "uploaded",
                to: "forced",
            }));
        }
        Err(StoreError::NotFound(local_id.to_string()))
    }

    /// Delete a report file outright.
    ///
    /// Used when consent is withheld at attempt time; skipped-then-deleted
    /// reports never reach the network.
    pub fn delete(&self, report: &Report) -> Result<(), StoreError> {
        fs::remove_file(&report.path)?;
        debug!(report = %report.name(), "Report deleted");
        Ok(())
    }

    /// Rename a report to record one more failed upload attempt.
    pub fn increment_attempt(&self, report: &Report) -> Result<Report, StoreError> {
        let target = report.name().with_incremented_attempt()?;
        self.apply_transition(report, target)
    }

    /// Retention sweep.
    ///
    /// Uploaded and temporary reports are deleted unconditionally. Of the
    /// remainder, anything older than the maximum age is deleted, and the
    /// surviving reports are grouped by their base identifier (a report and
    /// its sidecar artifacts live or die together); only the most recently
    /// modified `max_groups_to_keep` groups are kept. The upload manifest is
    /// never touched.
    pub fn purge(&self) -> Result<PurgeStats, StoreError> {
        let mut stats = PurgeStats::default();
        let mut survivors = Vec::new();

        for report in self.list_reports()? {
            match report.name().state() {
                ReportState::Uploaded => {
                    if delete_file(report.path()) {
                        stats.uploaded_deleted += 1;
                    }
                }
                ReportState::Temporary => {
                    if delete_file(report.path()) {
                        stats.temporary_deleted += 1;
                    }
                }
                _ => survivors.push(report),
            }
        }

        let now = SystemTime::now();
        let mut recent_groups: HashSet<String> = HashSet::new();
        for report in survivors {
            let age = now
                .duration_since(report.modified())
                .unwrap_or(Duration::ZERO);
            if age > self.limits.max_age {
                if delete_file(report.path()) {
                    stats.expired_deleted += 1;
                }
                continue;
            }

            let group = group_key(&report);
            if recent_groups.contains(&group) {
                continue;
            }
            if recent_groups.len() < self.limits.max_groups_to_keep {
                recent_groups.insert(group);
            } else if delete_file(report.path()) {
                stats.over_cap_deleted += 1;
            }
        }

        if stats.total() > 0 {
            info!(
                uploaded = stats.uploaded_deleted,
                temporary = stats.temporary_deleted,
                expired = stats.expired_deleted,
                over_cap = stats.over_cap_deleted,
                "Purge sweep deleted reports"
            );
        }
        Ok(stats)
    }

    /// Non-terminal, non-temporary reports: the set both quota caps count.
    fn quota_population(&self) -> Result<Vec<Report>, StoreError> {
        Ok(self
            .list_reports()?
            .into_iter()
            .filter(|report| {
                matches!(
                    report.name().state(),
                    ReportState::Pending { .. }
                        | ReportState::Skipped { .. }
                        | ReportState::Forced { .. }
                )
            })
            .collect())
    }

    /// Evict the oldest offending report for each cap that is full.
    ///
    /// Eviction failures are logged and do not abort the ingestion; the
    /// store still accepts the new report (matching the original behavior
    /// of preferring fresh crashes over old ones).
    fn enforce_quotas(&self, owner: OwnerId) -> Result<(), StoreError> {
        let mut reports = self.quota_population()?;

        let owned_oldest = reports
            .iter()
            .rposition(|report| report.name().owner() == Some(owner));
        let owned_count = reports
            .iter()
            .filter(|report| report.name().owner() == Some(owner))
            .count();
        if owned_count >= self.limits.max_per_owner {
            if let Some(idx) = owned_oldest {
                warn!(
                    owner = %owner,
                    report = %reports[idx].name(),
                    "Per-owner quota reached, evicting oldest report"
                );
                if delete_file(reports[idx].path()) {
                    reports.remove(idx);
                }
            }
        }

        if reports.len() >= self.limits.max_total {
            if let Some(report) = reports.last() {
                warn!(
                    report = %report.name(),
                    "Global quota reached, evicting oldest report"
                );
                delete_file(report.path());
            }
        }

        Ok(())
    }

    /// Apply a state transition as one atomic rename.
    ///
    /// On rename failure the source report is deleted: callers must accept
    /// that a transition can degrade to deletion under filesystem failure.
    fn apply_transition(&self, report: &Report, target: ReportName) -> Result<Report, StoreError> {
        let to = self.dir.join(target.file_name());
        match fs::rename(&report.path, &to) {
            Ok(()) => {
                debug!(from = %report.name(), to = %target, "Report state transition");
                Ok(Report {
                    path: to,
                    name: target,
                    // rename preserves the content modification time
                    modified: report.modified,
                })
            }
            Err(e) => {
                warn!(report = %report.name(), error = %e, "Rename failed, deleting report");
                if let Err(del) = fs::remove_file(&report.path) {
                    warn!(
                        report = %report.name(),
                        error = %del,
                        "Failed to delete report after rename failure"
                    );
                }
                Err(StoreError::Io(e))
            }
        }
    }
}

/// Retention group key: the owner prefix plus base identifier, i.e. the
/// file name up to the first state marker.
fn group_key(report: &Report) -> String {
    match report.name().owner() {
        Some(owner) => format!("{}_{}", owner, report.name().base()),
        None => report.name().base().to_string(),
    }
}

/// Delete a file, logging (but not propagating) failure.
fn delete_file(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unable to delete report file");
            false
        }
    }
}

/// Copy `source` into `dest`, failing once more than `limit` bytes arrive.
fn copy_bounded(source: &mut dyn Read, dest: &Path, limit: u64) -> Result<(), StoreError> {
    let mut file = File::create(dest)?;
    let mut buf = [0u8; COPY_BUFFER_BYTES];
    let mut total: u64 = 0;
    loop {
        let read = source.read(&mut buf)?;
        if read == 0 {
            return Ok(());
        }
        total += read as u64;
        if total > limit {
            warn!(limit, "Ingestion source exceeds size limit, bailing");
            return Err(StoreError::TooLarge { limit });
        }
        file.write_all(&buf[..read])?;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn limits() -> StoreLimits {
        StoreLimits {
            max_per_owner: 10,
            max_total: 20,
            max_groups_to_keep: 10,
            max_age: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }

    fn store_in(dir: &Path) -> ReportStore {
        ReportStore::new(dir.to_path_buf(), limits())
    }

    /// Create a report file directly, bypassing ingestion.
    fn seed_report(dir: &Path, file_name: &str) -> Report {
        let path = dir.join(file_name);
        fs::write(&path, b"MDMP").unwrap();
        Report {
            path,
            name: ReportName::parse(file_name).unwrap(),
            modified: SystemTime::now(),
        }
    }

    #[test]
    fn test_ensure_directory_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir.path().join("spool"));
        store.ensure_directory().unwrap();
        store.ensure_directory().unwrap();
        assert!(dir.path().join("spool").is_dir());
    }

    #[test]
    fn test_ensure_directory_rejects_non_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spool");
        fs::write(&path, b"not a dir").unwrap();

        let store = store_in(&path);
        match store.ensure_directory() {
            Err(StoreError::NotADirectory { .. }) => {}
            other => panic!("expected NotADirectory, got {other:?}"),
        }
    }

    #[test]
    fn test_ingest_creates_pending_report_with_owner_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let payload = b"MDMP-crash-bytes".to_vec();
        let report = store
            .ingest(&mut Cursor::new(payload.clone()), OwnerId::new(5), 1024)
            .unwrap();

        assert_eq!(report.name().owner(), Some(OwnerId::new(5)));
        assert_eq!(
            *report.name().state(),
            ReportState::Pending { attempts: 0 }
        );
        assert_eq!(fs::read(report.path()).unwrap(), payload);
        assert!(report
            .path()
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("5_"));
    }

    #[test]
    fn test_ingest_rejects_oversized_source_and_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let payload = vec![0u8; 4096];
        let err = store
            .ingest(&mut Cursor::new(payload), OwnerId::new(5), 100)
            .unwrap_err();
        assert!(matches!(err, StoreError::TooLarge { limit: 100 }));

        // No report, no temporary.
        assert!(store.list_reports().unwrap().is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_ingest_accepts_source_exactly_at_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let payload = vec![7u8; 256];
        let report = store
            .ingest(&mut Cursor::new(payload), OwnerId::new(1), 256)
            .unwrap();
        assert_eq!(fs::read(report.path()).unwrap().len(), 256);
    }

    #[test]
    fn test_mark_uploaded_strips_attempts_and_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let report = seed_report(dir.path(), "5_abc.dmp0.try2");

        let uploaded = store.mark_uploaded(&report).unwrap();
        assert_eq!(*uploaded.name().state(), ReportState::Uploaded);
        assert!(dir.path().join("5_abc.up0").exists());
        assert!(!dir.path().join("5_abc.dmp0.try2").exists());

        // Marking again is a no-op, not an error.
        let again = store.mark_uploaded(&uploaded).unwrap();
        assert_eq!(*again.name().state(), ReportState::Uploaded);
        assert!(dir.path().join("5_abc.up0").exists());
    }

    #[test]
    fn test_mark_skipped_preserves_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let report = seed_report(dir.path(), "abc.dmp.try1");

        let skipped = store.mark_skipped(&report).unwrap();
        assert_eq!(
            *skipped.name().state(),
            ReportState::Skipped { attempts: 1 }
        );
        assert!(dir.path().join("abc.skipped.try1").exists());
    }

    #[test]
    fn test_increment_attempt_renames_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let mut report = seed_report(dir.path(), "abc.dmp0");

        for expected in 1..=3u32 {
            report = store.increment_attempt(&report).unwrap();
            assert_eq!(report.name().attempts(), expected);
        }
        assert!(dir.path().join("abc.dmp0.try3").exists());
    }

    #[test]
    fn test_mark_forced_resets_attempts_from_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        seed_report(dir.path(), "abc.skipped0.try2");

        let forced = store.mark_forced("abc").unwrap();
        assert_eq!(*forced.name().state(), ReportState::Forced { attempts: 0 });
        assert!(dir.path().join("abc.forced0").exists());
    }

    #[test]
    fn test_mark_forced_unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(matches!(
            store.mark_forced("f297dbcba7a2d0bb"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_mark_forced_rejects_uploaded_report() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        seed_report(dir.path(), "abc.up0");

        assert!(matches!(
            store.mark_forced("abc"),
            Err(StoreError::Transition(_))
        ));
        // No change on disk.
        assert!(dir.path().join("abc.up0").exists());
    }

    #[test]
    fn test_lookup_excludes_uploaded() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        seed_report(dir.path(), "aaa.up0");
        seed_report(dir.path(), "bbb.skipped0");

        assert!(store.lookup_by_local_id("aaa").unwrap().is_none());
        let found = store.lookup_by_local_id("bbb").unwrap().unwrap();
        assert_eq!(
            *found.name().state(),
            ReportState::Skipped { attempts: 0 }
        );
    }

    #[test]
    fn test_list_eligible_applies_retry_gate() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        seed_report(dir.path(), "fresh.dmp");
        seed_report(dir.path(), "tried.dmp.try2");
        seed_report(dir.path(), "exhausted.dmp.try3");
        seed_report(dir.path(), "pushed.forced0.try9");
        seed_report(dir.path(), "done.up0");
        seed_report(dir.path(), "skipped.skipped0");
        seed_report(dir.path(), "partial.tmp");

        let eligible = store.list_eligible(3).unwrap();
        let names: Vec<_> = eligible.iter().map(|r| r.local_id().to_string()).collect();
        assert!(names.contains(&"fresh".to_string()));
        assert!(names.contains(&"tried".to_string()));
        // Forced bypasses the gate even with 9 attempts.
        assert!(names.contains(&"pushed".to_string()));
        assert!(!names.contains(&"exhausted".to_string()));
        assert!(!names.contains(&"done".to_string()));
        assert!(!names.contains(&"skipped".to_string()));
        assert!(!names.contains(&"partial".to_string()));
    }

    #[test]
    fn test_list_reports_orders_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let old = seed_report(dir.path(), "old.dmp");
        let new = seed_report(dir.path(), "new.dmp");
        set_age(old.path(), Duration::from_secs(3600));
        set_age(new.path(), Duration::from_secs(60));

        let reports = store.list_reports().unwrap();
        assert_eq!(reports[0].local_id(), "new");
        assert_eq!(reports[1].local_id(), "old");
    }

    /// Backdate a file's modification time.
    fn set_age(path: &Path, age: Duration) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }
}
