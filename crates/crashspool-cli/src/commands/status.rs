//! Status command - upload status lookup by local id

use anyhow::Result;
use clap::Args;
use crashspool_core::config::Config;
use crashspool_core::domain::LocalId;
use crashspool_upload::UploadStatus;

use crate::output::Output;

use super::{build_coordinator, open_store};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Local id of the report
    pub local_id: LocalId,
}

impl StatusCommand {
    pub fn execute(&self, config: &Config, out: &Output) -> Result<()> {
        let store = open_store(config);
        let coordinator = build_coordinator(config, store, None)?;
        let status = coordinator.status(self.local_id.as_str())?;

        if out.is_json() {
            out.print_json(&status_json(self.local_id.as_str(), &status));
            return Ok(());
        }

        match status {
            UploadStatus::Uploaded { remote_id } => match remote_id {
                Some(remote_id) => {
                    println!("{}: uploaded (remote id {remote_id})", self.local_id)
                }
                None => println!("{}: uploaded", self.local_id),
            },
            UploadStatus::Pending { attempts } => {
                println!("{}: pending ({attempts} attempt(s))", self.local_id)
            }
            UploadStatus::Forced { attempts } => {
                println!("{}: forced ({attempts} attempt(s))", self.local_id)
            }
            UploadStatus::Skipped { attempts } => {
                println!(
                    "{}: skipped after {attempts} attempt(s); use `crashspool force` to retry",
                    self.local_id
                )
            }
            UploadStatus::Unknown => out.error(&format!("no report matches {}", self.local_id)),
        }
        Ok(())
    }
}

fn status_json(local_id: &str, status: &UploadStatus) -> serde_json::Value {
    match status {
        UploadStatus::Uploaded { remote_id } => serde_json::json!({
            "local_id": local_id, "status": "uploaded", "remote_id": remote_id,
        }),
        UploadStatus::Pending { attempts } => serde_json::json!({
            "local_id": local_id, "status": "pending", "attempts": attempts,
        }),
        UploadStatus::Forced { attempts } => serde_json::json!({
            "local_id": local_id, "status": "forced", "attempts": attempts,
        }),
        UploadStatus::Skipped { attempts } => serde_json::json!({
            "local_id": local_id, "status": "skipped", "attempts": attempts,
        }),
        UploadStatus::Unknown => serde_json::json!({
            "local_id": local_id, "status": "unknown",
        }),
    }
}
