//! Force command - retry a report past the retry gate

use anyhow::Result;
use clap::Args;
use crashspool_core::config::Config;
use crashspool_core::domain::LocalId;
use crashspool_upload::UploadStatus;
use tracing::info;

use crate::output::Output;

use super::{build_coordinator, open_store};

#[derive(Debug, Args)]
pub struct ForceCommand {
    /// Local id of the report to force-upload
    pub local_id: LocalId,
}

impl ForceCommand {
    pub async fn execute(&self, config: &Config, out: &Output) -> Result<()> {
        let store = open_store(config);
        let coordinator = build_coordinator(config, store, None)?;

        match coordinator.status(self.local_id.as_str())? {
            UploadStatus::Unknown => {
                out.error(&format!("no report matches {}", self.local_id));
                return Ok(());
            }
            UploadStatus::Uploaded { .. } => {
                out.warn(&format!("{} was already uploaded", self.local_id));
                return Ok(());
            }
            _ => {}
        }
        if !config.upload.consent {
            out.warn("upload.consent is disabled; the report will be skipped, not uploaded");
        }

        info!(local_id = %self.local_id, "Forcing upload");
        coordinator.force_upload(self.local_id.as_str()).await;

        let status = coordinator.status(self.local_id.as_str())?;
        if out.is_json() {
            let status_label = match &status {
                UploadStatus::Uploaded { .. } => "uploaded",
                UploadStatus::Forced { .. } => "failed",
                UploadStatus::Skipped { .. } => "skipped",
                _ => "unknown",
            };
            out.print_json(&serde_json::json!({
                "local_id": self.local_id, "result": status_label,
            }));
            return Ok(());
        }
        match status {
            UploadStatus::Uploaded { remote_id } => out.success(&format!(
                "{} uploaded{}",
                self.local_id,
                remote_id
                    .map(|id| format!(" (remote id {id})"))
                    .unwrap_or_default()
            )),
            UploadStatus::Forced { attempts } => out.warn(&format!(
                "upload failed ({attempts} attempt(s)); the report stays forced and will retry",
            )),
            UploadStatus::Skipped { .. } => {
                out.warn(&format!("{} was skipped by the collector", self.local_id))
            }
            _ => out.warn(&format!("{} is gone from the spool", self.local_id)),
        }
        Ok(())
    }
}
