//! Upload command - attempt every eligible report once

use anyhow::Result;
use clap::Args;
use crashspool_core::config::Config;
use crashspool_upload::UploadEvent;
use tokio::sync::mpsc;

use crate::output::Output;

use super::{build_coordinator, open_store};

#[derive(Debug, Args)]
pub struct UploadCommand {}

impl UploadCommand {
    pub async fn execute(&self, config: &Config, out: &Output) -> Result<()> {
        if !config.upload.consent {
            out.warn("upload.consent is disabled; eligible reports will be skipped");
        }

        let store = open_store(config);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let coordinator = build_coordinator(config, store, Some(events_tx))?;

        coordinator.upload_all().await?;
        drop(coordinator);

        let mut uploaded = 0usize;
        let mut failed = 0usize;
        let mut skipped = 0usize;
        let mut results = Vec::new();
        while let Some(event) = events_rx.recv().await {
            match &event {
                UploadEvent::Succeeded { local_id, remote_id } => {
                    uploaded += 1;
                    results.push(serde_json::json!({
                        "local_id": local_id, "result": "uploaded", "remote_id": remote_id,
                    }));
                    if !out.is_json() {
                        out.success(&format!("{local_id} uploaded (remote id {remote_id})"));
                    }
                }
                UploadEvent::Failed { local_id, attempts } => {
                    failed += 1;
                    results.push(serde_json::json!({
                        "local_id": local_id, "result": "failed", "attempts": attempts,
                    }));
                    if !out.is_json() {
                        out.warn(&format!("{local_id} failed ({attempts} attempt(s) so far)"));
                    }
                }
                UploadEvent::Skipped { local_id } => {
                    skipped += 1;
                    results.push(serde_json::json!({
                        "local_id": local_id, "result": "skipped",
                    }));
                    if !out.is_json() {
                        out.warn(&format!("{local_id} skipped"));
                    }
                }
            }
        }

        if out.is_json() {
            out.print_json(&serde_json::json!({
                "uploaded": uploaded, "failed": failed, "skipped": skipped,
                "results": results,
            }));
        } else if uploaded + failed + skipped == 0 {
            println!("Nothing eligible to upload");
        }
        Ok(())
    }
}
