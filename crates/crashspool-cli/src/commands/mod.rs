//! CLI subcommands

pub mod force;
pub mod ingest;
pub mod list;
pub mod purge;
pub mod status;
pub mod upload;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crashspool_core::config::Config;
use crashspool_core::ports::StaticConsent;
use crashspool_store::{ReportStore, StoreLimits};
use crashspool_upload::{HttpUploader, UploadCoordinator, UploadEvent};
use tokio::sync::mpsc;

/// Open the spool configured in `config`.
pub(crate) fn open_store(config: &Config) -> Arc<ReportStore> {
    Arc::new(ReportStore::new(
        config.store.dir.clone(),
        StoreLimits::from(&config.store),
    ))
}

/// Build a one-shot coordinator over `store` from the configuration.
pub(crate) fn build_coordinator(
    config: &Config,
    store: Arc<ReportStore>,
    events: Option<mpsc::UnboundedSender<UploadEvent>>,
) -> Result<UploadCoordinator> {
    let uploader = Arc::new(
        HttpUploader::new(
            config.upload.url.clone(),
            Duration::from_secs(config.upload.timeout_secs),
        )
        .context("building upload client")?,
    );
    let consent = Arc::new(StaticConsent::new(config.upload.consent));
    let mut coordinator =
        UploadCoordinator::new(store, uploader, consent, config.upload.max_tries);
    if let Some(events) = events {
        coordinator = coordinator.with_events(events);
    }
    Ok(coordinator)
}
