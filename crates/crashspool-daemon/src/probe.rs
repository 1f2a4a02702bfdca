//! Connectivity probe
//!
//! Stand-in for a platform connectivity observer: probes the upload
//! endpoint on an interval and reports *transitions* (not every result)
//! into the coordinator's trigger channel. The coordinator only rescans on
//! the offline→online edge, so a flapping link produces at most one scan
//! per recovery.

use std::time::Duration;

use crashspool_upload::UploadTrigger;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Timeout for a single probe request
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Periodically probes the collector endpoint for reachability
pub struct ConnectivityProbe {
    client: Client,
    url: String,
    interval: Duration,
    triggers: mpsc::UnboundedSender<UploadTrigger>,
}

impl ConnectivityProbe {
    /// Creates a probe against `url`, reporting into `triggers`.
    pub fn new(
        url: impl Into<String>,
        interval: Duration,
        triggers: mpsc::UnboundedSender<UploadTrigger>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(PROBE_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
            interval,
            triggers,
        })
    }

    /// Probe until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut timer = tokio::time::interval(self.interval);
        // Unknown until the first probe answers; only changes are reported.
        let mut connected: Option<bool> = None;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    // Any HTTP response proves reachability; only transport
                    // failures count as offline.
                    let now = self.client.head(&self.url).send().await.is_ok();
                    if connected != Some(now) {
                        info!(connected = now, "Connectivity changed");
                        if self
                            .triggers
                            .send(UploadTrigger::Connectivity { connected: now })
                            .is_err()
                        {
                            debug!("Trigger channel closed, probe stopping");
                            break;
                        }
                        connected = Some(now);
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Connectivity probe shutting down");
                    break;
                }
            }
        }
    }
}
