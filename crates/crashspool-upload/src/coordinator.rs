//! Upload coordination
//!
//! The [`UploadCoordinator`] decides which reports to attempt, drives each
//! attempt against the [`IUploader`] capability and asks the store to
//! transition report state based on the outcome.
//!
//! ## Flow
//!
//! ```text
//! triggers (mpsc) ──→ run() loop ──→ upload_all() ──→ attempt per report
//!   connectivity            │                              │
//!   consent                 └── coalesces bursts           └── IUploader
//!   force-upload
//! ```
//!
//! At most one attempt is in flight per report at any time, enforced by an
//! in-memory set behind a single mutex. Membership is added before the
//! uploader is invoked and removed by a drop guard on every exit path.
//! Connectivity loss never cancels an attempt already in flight; it only
//! defers future scans until connectivity returns.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crashspool_core::domain::ReportState;
use crashspool_core::ports::{IConsentProvider, IUploader, UploadOutcome};
use crashspool_store::{Report, ReportStore, StoreError};
use crashspool_telemetry::MetricsRegistry;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classifier::classify;

/// External signals that drive the coordinator's event loop.
///
/// A burst of queued triggers is coalesced into at most one fresh scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadTrigger {
    /// Explicit request to scan and attempt every eligible report
    UploadAll,
    /// Connectivity observer transition. Only the offline→online edge
    /// causes a scan; going offline defers scans instead.
    Connectivity {
        /// Whether the network is now available
        connected: bool,
    },
    /// Consent change. Withdrawal skips every report awaiting upload.
    Consent {
        /// Whether uploading is now permitted
        granted: bool,
    },
    /// User-initiated forced upload of one report, bypassing the retry gate
    Force {
        /// Local id of the report to force
        local_id: String,
    },
}

/// Outcome notifications for collaborators (UI surfaces, tests).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    /// A report was accepted by the receiving service
    Succeeded {
        /// Local id of the uploaded report
        local_id: String,
        /// Identifier assigned by the receiving service
        remote_id: String,
    },
    /// An attempt failed; the report may be retried
    Failed {
        /// Local id of the report
        local_id: String,
        /// Attempt count after this failure
        attempts: u32,
    },
    /// The report was skipped and will never be auto-retried
    Skipped {
        /// Local id of the report
        local_id: String,
    },
}

/// Result of a status lookup by local id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    /// The report was uploaded. The remote id is known if the upload
    /// manifest recorded it.
    Uploaded {
        /// Identifier assigned by the receiving service, if recorded
        remote_id: Option<String>,
    },
    /// Awaiting upload
    Pending {
        /// Attempts made so far
        attempts: u32,
    },
    /// Forced by the user, awaiting upload
    Forced {
        /// Attempts made since the force
        attempts: u32,
    },
    /// Skipped; only a forced upload will retry it
    Skipped {
        /// Attempts made before the skip
        attempts: u32,
    },
    /// No report or upload record matches the id
    Unknown,
}

/// Drives upload attempts and reacts to environment signals
pub struct UploadCoordinator {
    store: Arc<ReportStore>,
    uploader: Arc<dyn IUploader>,
    consent: Arc<dyn IConsentProvider>,
    max_tries: u32,
    /// Local ids with an attempt currently in flight
    in_flight: Mutex<HashSet<String>>,
    events: Option<mpsc::UnboundedSender<UploadEvent>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl UploadCoordinator {
    /// Creates a coordinator over `store` using the given uploader and
    /// consent provider.
    #[must_use]
    pub fn new(
        store: Arc<ReportStore>,
        uploader: Arc<dyn IUploader>,
        consent: Arc<dyn IConsentProvider>,
        max_tries: u32,
    ) -> Self {
        Self {
            store,
            uploader,
            consent,
            max_tries,
            in_flight: Mutex::new(HashSet::new()),
            events: None,
            metrics: None,
        }
    }

    /// Emit [`UploadEvent`]s on the given channel.
    #[must_use]
    pub fn with_events(mut self, events: mpsc::UnboundedSender<UploadEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Record upload outcomes into the given metrics registry.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Scan for eligible reports and attempt each sequentially.
    ///
    /// Reports with an attempt already in flight are skipped. Per-report
    /// failures are logged and do not abort the scan.
    pub async fn upload_all(&self) -> Result<(), StoreError> {
        let eligible = self.store.list_eligible(self.max_tries)?;
        if !eligible.is_empty() {
            info!(count = eligible.len(), "Attempting eligible crash reports");
        }
        for report in eligible {
            self.upload_one(report).await;
        }
        Ok(())
    }

    /// Attempt a single report, outside the normal eligibility gate.
    ///
    /// Used for freshly ingested reports and forced uploads. A no-op if an
    /// attempt for the same report is already in flight.
    pub async fn upload_one(&self, report: Report) {
        let Some(_guard) = InFlightGuard::try_acquire(&self.in_flight, report.local_id()) else {
            debug!(report = %report.name(), "Attempt already in flight, not re-selecting");
            return;
        };
        self.attempt(&report).await;
    }

    /// Force-upload the report with the given local id.
    ///
    /// Resolves the id against non-terminal reports, resets its attempt
    /// count, and attempts it immediately regardless of prior attempts.
    /// A silent no-op if no report matches.
    pub async fn force_upload(&self, local_id: &str) {
        match self.store.mark_forced(local_id) {
            Ok(report) => self.upload_one(report).await,
            Err(StoreError::NotFound(_)) => {
                debug!(local_id, "No report matches local id, ignoring force request");
            }
            Err(e) => {
                warn!(local_id, error = %e, "Cannot force upload");
            }
        }
    }

    /// Status lookup by local id, for user-facing surfaces.
    pub fn status(&self, local_id: &str) -> Result<UploadStatus, StoreError> {
        if let Some(entry) = self.store.upload_log().find(local_id)? {
            return Ok(UploadStatus::Uploaded {
                remote_id: Some(entry.remote_id),
            });
        }

        if let Some(report) = self.store.lookup_by_local_id(local_id)? {
            let status = match report.name().state() {
                ReportState::Pending { attempts } => UploadStatus::Pending {
                    attempts: *attempts,
                },
                ReportState::Forced { attempts } => UploadStatus::Forced {
                    attempts: *attempts,
                },
                ReportState::Skipped { attempts } => UploadStatus::Skipped {
                    attempts: *attempts,
                },
                _ => UploadStatus::Unknown,
            };
            return Ok(status);
        }

        // Uploaded on disk but missing from the manifest (e.g. the manifest
        // append failed after a successful upload).
        let uploaded = self.store.list_reports()?.into_iter().any(|report| {
            report.name().state().is_terminal() && report.name().matches_local_id(local_id)
        });
        if uploaded {
            return Ok(UploadStatus::Uploaded { remote_id: None });
        }
        Ok(UploadStatus::Unknown)
    }

    /// Event loop: consume triggers until the channel closes or `shutdown`
    /// fires.
    ///
    /// Queued triggers are drained and coalesced so a burst of
    /// connectivity/consent signals produces at most one fresh scan. Scans
    /// requested while offline are deferred and flushed on the
    /// offline→online transition.
    pub async fn run(&self, mut triggers: mpsc::UnboundedReceiver<UploadTrigger>, shutdown: CancellationToken) {
        info!("Upload coordinator starting");
        let mut connected = true;

        loop {
            let trigger = tokio::select! {
                trigger = triggers.recv() => trigger,
                _ = shutdown.cancelled() => {
                    info!("Upload coordinator shutting down");
                    break;
                }
            };
            let Some(trigger) = trigger else {
                info!("Trigger channel closed, coordinator stopping");
                break;
            };

            // Drain whatever else queued up behind this trigger.
            let mut batch = vec![trigger];
            while let Ok(more) = triggers.try_recv() {
                batch.push(more);
            }

            let mut scan = false;
            for trigger in batch {
                match trigger {
                    UploadTrigger::UploadAll => scan = true,
                    UploadTrigger::Connectivity { connected: now } => {
                        if now && !connected {
                            debug!("Connectivity restored");
                            scan = true;
                        }
                        connected = now;
                    }
                    UploadTrigger::Consent { granted } => {
                        if !granted {
                            self.skip_awaiting_reports().await;
                        }
                    }
                    UploadTrigger::Force { local_id } => {
                        self.force_upload(&local_id).await;
                    }
                }
            }

            if scan {
                if connected {
                    if let Err(e) = self.upload_all().await {
                        warn!(error = %e, "Upload scan failed");
                    }
                } else {
                    debug!("Offline, deferring scan until connectivity returns");
                }
            }
        }
    }

    /// Consent was withdrawn: transition every report awaiting upload (and
    /// not currently in flight) to skipped. Deletion is left to the next
    /// retention sweep.
    async fn skip_awaiting_reports(&self) {
        let reports = match self.store.list_reports() {
            Ok(reports) => reports,
            Err(e) => {
                warn!(error = %e, "Cannot list reports to apply consent withdrawal");
                return;
            }
        };
        for report in reports {
            let awaiting = matches!(
                report.name().state(),
                ReportState::Pending { .. } | ReportState::Forced { .. }
            );
            if !awaiting {
                continue;
            }
            let Some(_guard) = InFlightGuard::try_acquire(&self.in_flight, report.local_id())
            else {
                // An in-flight attempt is never cancelled; its outcome
                // handler owns this report.
                continue;
            };
            info!(report = %report.name(), "Consent withdrawn, skipping report");
            if let Err(e) = self.store.mark_skipped(&report) {
                warn!(report = %report.name(), error = %e, "Failed to skip report");
            }
            self.emit(UploadEvent::Skipped {
                local_id: report.local_id().to_string(),
            });
        }
    }

    /// One upload attempt. The caller holds the in-flight guard.
    async fn attempt(&self, report: &Report) {
        let payload = match tokio::fs::read(report.path()).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(report = %report.name(), error = %e, "Failed to read report, leaving it for a later cycle");
                return;
            }
        };
        let crash_type = classify(&payload);

        // Consent can be withdrawn between selection and attempt.
        if !self.consent.granted() {
            info!(report = %report.name(), "Consent withheld, skipping report without uploading");
            match self.store.mark_skipped(report) {
                Ok(skipped) => {
                    if let Err(e) = self.store.delete(&skipped) {
                        warn!(report = %skipped.name(), error = %e, "Failed to delete skipped report");
                    }
                }
                Err(e) => {
                    warn!(report = %report.name(), error = %e, "Failed to skip report");
                }
            }
            self.record(crash_type.label(), "consent_denied", None);
            self.emit(UploadEvent::Skipped {
                local_id: report.local_id().to_string(),
            });
            return;
        }

        debug!(report = %report.name(), crash_type = %crash_type, bytes = payload.len(), "Attempting upload");
        let started = Instant::now();
        let outcome = self.uploader.attempt(&payload, crash_type).await;
        let elapsed = started.elapsed().as_secs_f64();

        match outcome {
            UploadOutcome::Success { remote_id } => {
                info!(report = %report.name(), remote_id = %remote_id, "Report uploaded");
                if let Err(e) = self.store.mark_uploaded(report) {
                    warn!(report = %report.name(), error = %e, "Failed to mark report uploaded");
                }
                if let Err(e) = self.store.upload_log().append(report.local_id(), &remote_id) {
                    warn!(error = %e, "Failed to record upload in manifest");
                }
                self.record(crash_type.label(), "success", Some(elapsed));
                self.emit(UploadEvent::Succeeded {
                    local_id: report.local_id().to_string(),
                    remote_id,
                });
            }
            UploadOutcome::Retryable { reason } => {
                warn!(report = %report.name(), reason = %reason, "Upload attempt failed");
                self.record(crash_type.label(), "retryable", Some(elapsed));
                match self.store.increment_attempt(report) {
                    Ok(updated) => {
                        let attempts = updated.name().attempts();
                        let forced = matches!(updated.name().state(), ReportState::Forced { .. });
                        if !forced && attempts >= self.max_tries {
                            warn!(
                                report = %updated.name(),
                                attempts,
                                "Retry budget exhausted; only a forced upload can retry this report"
                            );
                        }
                        self.emit(UploadEvent::Failed {
                            local_id: updated.local_id().to_string(),
                            attempts,
                        });
                    }
                    Err(e) => {
                        warn!(report = %report.name(), error = %e, "Failed to record upload attempt");
                    }
                }
            }
            UploadOutcome::Terminal { reason } => {
                warn!(report = %report.name(), reason = %reason, "Receiver rejected report, skipping permanently");
                self.record(crash_type.label(), "terminal", Some(elapsed));
                if let Err(e) = self.store.mark_skipped(report) {
                    warn!(report = %report.name(), error = %e, "Failed to skip report");
                }
                self.emit(UploadEvent::Skipped {
                    local_id: report.local_id().to_string(),
                });
            }
        }
    }

    fn emit(&self, event: UploadEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    fn record(&self, crash_type: &str, outcome: &str, elapsed_secs: Option<f64>) {
        if let Some(metrics) = &self.metrics {
            metrics.record_upload(outcome, crash_type);
            if let Some(elapsed) = elapsed_secs {
                metrics.observe_upload_duration(outcome, elapsed);
            }
        }
    }
}

/// Membership in the in-flight set, released on drop.
///
/// Acquired before the uploader is invoked; dropping on every exit path is
/// what guarantees a stuck entry cannot outlive its attempt.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> InFlightGuard<'a> {
    fn try_acquire(set: &'a Mutex<HashSet<String>>, id: &str) -> Option<Self> {
        let mut guard = set.lock().unwrap_or_else(|e| e.into_inner());
        if !guard.insert(id.to_string()) {
            return None;
        }
        Some(Self {
            set,
            id: id.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut guard = self.set.lock().unwrap_or_else(|e| e.into_inner());
        guard.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crashspool_core::domain::{CrashType, OwnerId};
    use crashspool_core::ports::StaticConsent;
    use crashspool_store::StoreLimits;

    use super::*;

    /// Uploader returning a fixed outcome, counting its calls.
    struct FixedUploader {
        outcome: UploadOutcome,
        calls: AtomicUsize,
    }

    impl FixedUploader {
        fn new(outcome: UploadOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl IUploader for FixedUploader {
        async fn attempt(&self, _payload: &[u8], _crash_type: CrashType) -> UploadOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn limits() -> StoreLimits {
        StoreLimits {
            max_per_owner: 10,
            max_total: 20,
            max_groups_to_keep: 10,
            max_age: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }

    fn spool(dir: &std::path::Path) -> Arc<ReportStore> {
        Arc::new(ReportStore::new(dir.to_path_buf(), limits()))
    }

    fn ingest(store: &ReportStore) -> Report {
        store
            .ingest(
                &mut Cursor::new(b"MDMP-payload".to_vec()),
                OwnerId::new(5),
                1024,
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_successful_upload_is_terminal_and_logged() {
        let dir = tempfile::tempdir().unwrap();
        let store = spool(dir.path());
        let uploader = FixedUploader::new(UploadOutcome::Success {
            remote_id: "remote-42".to_string(),
        });
        let coordinator = UploadCoordinator::new(
            Arc::clone(&store),
            uploader.clone(),
            Arc::new(StaticConsent::new(true)),
            3,
        );

        let report = ingest(&store);
        let local_id = report.local_id().to_string();
        coordinator.upload_one(report).await;

        assert_eq!(uploader.calls(), 1);
        assert!(store.list_eligible(3).unwrap().is_empty());
        let entry = store.upload_log().find(&local_id).unwrap().unwrap();
        assert_eq!(entry.remote_id, "remote-42");
        assert_eq!(
            coordinator.status(&local_id).unwrap(),
            UploadStatus::Uploaded {
                remote_id: Some("remote-42".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_terminal_failure_skips_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = spool(dir.path());
        let uploader = FixedUploader::new(UploadOutcome::Terminal {
            reason: "malformed".to_string(),
        });
        let coordinator = UploadCoordinator::new(
            Arc::clone(&store),
            uploader.clone(),
            Arc::new(StaticConsent::new(true)),
            3,
        );

        let report = ingest(&store);
        let local_id = report.local_id().to_string();
        coordinator.upload_one(report).await;

        assert_eq!(uploader.calls(), 1);
        assert_eq!(
            coordinator.status(&local_id).unwrap(),
            UploadStatus::Skipped { attempts: 0 }
        );
    }

    #[tokio::test]
    async fn test_consent_denied_skips_and_deletes_without_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let store = spool(dir.path());
        let uploader = FixedUploader::new(UploadOutcome::Success {
            remote_id: "never".to_string(),
        });
        let coordinator = UploadCoordinator::new(
            Arc::clone(&store),
            uploader.clone(),
            Arc::new(StaticConsent::new(false)),
            3,
        );

        let report = ingest(&store);
        coordinator.upload_one(report).await;

        assert_eq!(uploader.calls(), 0, "no network attempt may be made");
        assert!(store.list_reports().unwrap().is_empty(), "report is deleted");
    }

    #[tokio::test]
    async fn test_force_upload_unknown_id_is_silent_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = spool(dir.path());
        let uploader = FixedUploader::new(UploadOutcome::Success {
            remote_id: "never".to_string(),
        });
        let coordinator = UploadCoordinator::new(
            Arc::clone(&store),
            uploader.clone(),
            Arc::new(StaticConsent::new(true)),
            3,
        );

        coordinator.force_upload("f297dbcba7a2d0bb").await;

        assert_eq!(uploader.calls(), 0);
    }

    #[tokio::test]
    async fn test_status_unknown_for_unseen_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = spool(dir.path());
        let coordinator = UploadCoordinator::new(
            Arc::clone(&store),
            FixedUploader::new(UploadOutcome::Retryable {
                reason: "x".to_string(),
            }),
            Arc::new(StaticConsent::new(true)),
            3,
        );

        assert_eq!(
            coordinator.status("missing").unwrap(),
            UploadStatus::Unknown
        );
    }
}
