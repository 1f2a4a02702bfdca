//! Inbox directory watcher
//!
//! The daemon's ingestion trigger: an external hand-off mechanism moves
//! crash artifacts into the inbox directory (atomically, via rename), and
//! the watcher ingests each one into the spool, deletes the inbox copy and
//! issues an immediate upload attempt for the fresh report.
//!
//! ```text
//! inotify ──→ mpsc::channel ──→ InboxWatcher ──→ spawn_blocking ingest
//!                                     │
//!                                     └──→ coordinator.upload_one()
//! ```
//!
//! The inbox copy is deleted even when ingestion fails: a copy that failed
//! once (oversized, unreadable) would fail the same way on every retry, so
//! keeping it only replays the failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use crashspool_core::config::InboxConfig;
use crashspool_core::domain::OwnerId;
use crashspool_store::{Report, ReportStore, StoreError};
use crashspool_telemetry::MetricsRegistry;
use crashspool_upload::UploadCoordinator;
use notify::event::{EventKind, ModifyKind};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Watches the inbox directory and feeds arrivals into the spool
pub struct InboxWatcher {
    config: InboxConfig,
    store: Arc<ReportStore>,
    coordinator: Arc<UploadCoordinator>,
    size_limit: u64,
    metrics: Arc<MetricsRegistry>,
}

impl InboxWatcher {
    /// Creates a watcher over the configured inbox directory.
    pub fn new(
        config: InboxConfig,
        store: Arc<ReportStore>,
        coordinator: Arc<UploadCoordinator>,
        size_limit: u64,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            config,
            store,
            coordinator,
            size_limit,
            metrics,
        }
    }

    /// Watch until `shutdown` fires.
    ///
    /// Files already waiting in the inbox when the watcher starts are
    /// picked up before any events are consumed.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        std::fs::create_dir_all(&self.config.dir)
            .with_context(|| format!("creating inbox directory {}", self.config.dir.display()))?;

        let (tx, mut rx) = mpsc::channel::<PathBuf>(256);
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    let arrived = matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_))
                    );
                    if arrived {
                        for path in event.paths {
                            if let Err(e) = tx.blocking_send(path) {
                                warn!(error = %e, "Failed to queue inbox arrival (receiver dropped)");
                            }
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Inbox watcher error"),
            },
            notify::Config::default(),
        )
        .context("creating inbox watcher")?;
        watcher
            .watch(&self.config.dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("watching {}", self.config.dir.display()))?;

        info!(dir = %self.config.dir.display(), "Inbox watcher started");

        // Anything that arrived before the watcher did.
        for entry in std::fs::read_dir(&self.config.dir)? {
            let entry = entry?;
            self.handle_arrival(entry.path()).await;
        }

        loop {
            tokio::select! {
                arrival = rx.recv() => match arrival {
                    Some(path) => self.handle_arrival(path).await,
                    None => break,
                },
                _ = shutdown.cancelled() => {
                    info!("Inbox watcher shutting down");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Ingest one inbox file, delete the inbox copy and attempt the upload.
    async fn handle_arrival(&self, path: PathBuf) {
        if !path.is_file() {
            return;
        }
        let owner = owner_from_file_name(&path)
            .unwrap_or_else(|| OwnerId::new(self.config.default_owner));

        let store = Arc::clone(&self.store);
        let size_limit = self.size_limit;
        let ingest_path = path.clone();
        let outcome = tokio::task::spawn_blocking(move || ingest_file(&store, &ingest_path, owner, size_limit))
            .await;

        match outcome {
            Ok(Ok(Some(report))) => {
                self.metrics.record_ingested();
                info!(inbox_file = %path.display(), report = %report.name(), "Inbox file spooled");
                self.coordinator.upload_one(report).await;
            }
            Ok(Ok(None)) => {
                // Already consumed by an earlier event for the same file.
                debug!(inbox_file = %path.display(), "Inbox file already handled");
            }
            Ok(Err(e)) => {
                warn!(inbox_file = %path.display(), error = %e, "Failed to spool inbox file");
            }
            Err(e) => {
                warn!(error = %e, "Inbox ingestion task panicked");
            }
        }
    }
}

/// Copy an inbox file into the spool, then delete the inbox copy.
///
/// Returns `Ok(None)` if the file vanished before we opened it (duplicate
/// event for an already-handled arrival).
fn ingest_file(
    store: &ReportStore,
    path: &Path,
    owner: OwnerId,
    size_limit: u64,
) -> Result<Option<Report>, StoreError> {
    let mut file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::Io(e)),
    };

    let result = store.ingest(&mut file, owner, size_limit);

    // The inbox copy is dropped regardless of the outcome.
    if let Err(e) = std::fs::remove_file(path) {
        warn!(inbox_file = %path.display(), error = %e, "Failed to delete inbox copy");
    }

    result.map(Some)
}

/// Parse an `{digits}_` owner prefix from an inbox file name.
fn owner_from_file_name(path: &Path) -> Option<OwnerId> {
    let name = path.file_name()?.to_str()?;
    let (prefix, rest) = name.split_once('_')?;
    if prefix.is_empty() || rest.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok()
}
