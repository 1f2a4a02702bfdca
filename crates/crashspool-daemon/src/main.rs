//! Crashspool Daemon - background crash-report upload service
//!
//! This binary runs as a system service and handles:
//! - Ingestion of crash artifacts dropped into the inbox directory
//! - Upload attempts against the configured collector, with bounded retry
//! - Connectivity-aware retry (rescans on the offline→online transition)
//! - Daily retention sweeps of the spool
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon wires the store, coordinator, inbox watcher, connectivity
//! probe and metrics server together, then parks in a sweep loop. All
//! background tasks are controlled by one `CancellationToken` that is
//! triggered on receipt of SIGTERM or SIGINT.

mod inbox;
mod probe;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crashspool_core::config::Config;
use crashspool_core::ports::StaticConsent;
use crashspool_store::{PurgeStats, ReportStore, StoreLimits};
use crashspool_telemetry::{MetricsRegistry, MetricsServer};
use crashspool_upload::{HttpUploader, UploadCoordinator, UploadTrigger};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use inbox::InboxWatcher;
use probe::ConnectivityProbe;

/// Seconds between retention sweeps
const PURGE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Parser)]
#[command(name = "crashspoold", version, about = "Crash report spool daemon")]
struct Args {
    /// Use alternate config file
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Owns the wired-up components for one daemon run
struct SpoolDaemon {
    config: Config,
    store: Arc<ReportStore>,
    coordinator: Arc<UploadCoordinator>,
    metrics: Arc<MetricsRegistry>,
    triggers: mpsc::UnboundedSender<UploadTrigger>,
    shutdown: CancellationToken,
}

impl SpoolDaemon {
    fn new(config: Config, shutdown: CancellationToken) -> Result<(Self, mpsc::UnboundedReceiver<UploadTrigger>)> {
        let store = Arc::new(ReportStore::new(
            config.store.dir.clone(),
            StoreLimits::from(&config.store),
        ));
        store
            .ensure_directory()
            .context("creating spool directory")?;

        let metrics = Arc::new(MetricsRegistry::new()?);
        let uploader = Arc::new(
            HttpUploader::new(
                config.upload.url.clone(),
                Duration::from_secs(config.upload.timeout_secs),
            )
            .context("building upload client")?,
        );
        let consent = Arc::new(StaticConsent::new(config.upload.consent));
        let coordinator = Arc::new(
            UploadCoordinator::new(
                Arc::clone(&store),
                uploader,
                consent,
                config.upload.max_tries,
            )
            .with_metrics(Arc::clone(&metrics)),
        );

        let (triggers, trigger_rx) = mpsc::unbounded_channel();

        Ok((
            Self {
                config,
                store,
                coordinator,
                metrics,
                triggers,
                shutdown,
            },
            trigger_rx,
        ))
    }

    /// Spawn the background tasks and park in the sweep loop until
    /// shutdown.
    async fn run(&self, trigger_rx: mpsc::UnboundedReceiver<UploadTrigger>) -> Result<()> {
        if self.config.metrics.enabled {
            let server = MetricsServer::new(Arc::clone(&self.metrics), &self.config.metrics.endpoint)?;
            let token = self.shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = server.run(token).await {
                    error!(error = %e, "Metrics server failed");
                }
            });
        }

        let coordinator_task = tokio::spawn({
            let coordinator = Arc::clone(&self.coordinator);
            let token = self.shutdown.clone();
            async move { coordinator.run(trigger_rx, token).await }
        });

        let inbox = InboxWatcher::new(
            self.config.inbox.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.coordinator),
            self.config.store.max_report_bytes,
            Arc::clone(&self.metrics),
        );
        let inbox_task = tokio::spawn({
            let token = self.shutdown.clone();
            async move {
                if let Err(e) = inbox.run(token).await {
                    error!(error = %e, "Inbox watcher failed");
                }
            }
        });

        let probe = ConnectivityProbe::new(
            self.config.upload.url.clone(),
            Duration::from_secs(self.config.inbox.probe_interval_secs),
            self.triggers.clone(),
        )
        .context("building connectivity probe")?;
        tokio::spawn({
            let token = self.shutdown.clone();
            async move { probe.run(token).await }
        });

        // Startup: sweep out stale reports, then scan for uploadable ones.
        self.sweep().await;
        let _ = self.triggers.send(UploadTrigger::UploadAll);

        let mut purge_timer = tokio::time::interval(PURGE_INTERVAL);
        purge_timer.tick().await; // immediate first tick already handled above
        loop {
            tokio::select! {
                _ = purge_timer.tick() => {
                    self.sweep().await;
                    let _ = self.triggers.send(UploadTrigger::UploadAll);
                }
                _ = self.shutdown.cancelled() => break,
            }
        }

        let _ = coordinator_task.await;
        let _ = inbox_task.await;
        Ok(())
    }

    /// Run one retention sweep off the async runtime and record it.
    async fn sweep(&self) {
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.purge()).await {
            Ok(Ok(stats)) => {
                self.record_sweep(&stats);
                self.refresh_spool_gauge();
            }
            Ok(Err(e)) => warn!(error = %e, "Retention sweep failed"),
            Err(e) => warn!(error = %e, "Retention sweep task panicked"),
        }
    }

    fn record_sweep(&self, stats: &PurgeStats) {
        self.metrics
            .record_purged("uploaded", stats.uploaded_deleted as u64);
        self.metrics
            .record_purged("temporary", stats.temporary_deleted as u64);
        self.metrics
            .record_purged("expired", stats.expired_deleted as u64);
        self.metrics
            .record_purged("over_cap", stats.over_cap_deleted as u64);
    }

    /// Refresh the per-state spool gauge from the directory contents.
    fn refresh_spool_gauge(&self) {
        let reports = match self.store.list_reports() {
            Ok(reports) => reports,
            Err(e) => {
                warn!(error = %e, "Cannot scan spool for gauge refresh");
                return;
            }
        };
        for state in ["pending", "uploaded", "skipped", "forced", "temporary"] {
            let count = reports
                .iter()
                .filter(|r| r.name().state().label() == state)
                .count();
            self.metrics.set_reports_in_spool(state, count as i64);
        }
    }
}

/// Cancel `token` when SIGINT or SIGTERM arrives.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    let issues = config.validate();
    if !issues.is_empty() {
        for issue in &issues {
            error!(%issue, "Configuration problem");
        }
        anyhow::bail!("invalid configuration in {}", config_path.display());
    }

    info!(
        config = %config_path.display(),
        spool = %config.store.dir.display(),
        "Crashspool daemon starting (crashspoold)"
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let (daemon, trigger_rx) = SpoolDaemon::new(config, shutdown)?;
    let result = daemon.run(trigger_rx).await;

    match &result {
        Ok(()) => info!("Crashspool daemon shut down gracefully"),
        Err(e) => error!(error = %e, "Crashspool daemon exiting with error"),
    }
    result
}
