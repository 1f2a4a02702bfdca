//! Ingest command - copy a crash artifact into the spool

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use crashspool_core::config::Config;
use crashspool_core::domain::OwnerId;

use crate::output::Output;

use super::open_store;

#[derive(Debug, Args)]
pub struct IngestCommand {
    /// Crash artifact to ingest
    pub file: PathBuf,

    /// Owner id recorded for the report (defaults to inbox.default_owner)
    #[arg(long)]
    pub owner: Option<u32>,
}

impl IngestCommand {
    pub fn execute(&self, config: &Config, out: &Output) -> Result<()> {
        let store = open_store(config);
        let owner = OwnerId::new(self.owner.unwrap_or(config.inbox.default_owner));

        let mut file = File::open(&self.file)
            .with_context(|| format!("opening {}", self.file.display()))?;
        let report = store.ingest(&mut file, owner, config.store.max_report_bytes)?;

        if out.is_json() {
            out.print_json(&serde_json::json!({
                "local_id": report.local_id(),
                "owner": owner.value(),
            }));
        } else {
            out.success(&format!("Spooled report {}", report.local_id()));
        }
        Ok(())
    }
}
