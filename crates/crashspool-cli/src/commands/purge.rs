//! Purge command - run a retention sweep now

use anyhow::Result;
use clap::Args;
use crashspool_core::config::Config;

use crate::output::Output;

use super::open_store;

#[derive(Debug, Args)]
pub struct PurgeCommand {}

impl PurgeCommand {
    pub fn execute(&self, config: &Config, out: &Output) -> Result<()> {
        let store = open_store(config);
        let stats = store.purge()?;

        if out.is_json() {
            out.print_json(&serde_json::json!({
                "uploaded_deleted": stats.uploaded_deleted,
                "temporary_deleted": stats.temporary_deleted,
                "expired_deleted": stats.expired_deleted,
                "over_cap_deleted": stats.over_cap_deleted,
            }));
            return Ok(());
        }

        if stats.total() == 0 {
            println!("Nothing to purge");
        } else {
            out.success(&format!(
                "Purged {} report file(s): {} uploaded, {} temporary, {} expired, {} over cap",
                stats.total(),
                stats.uploaded_deleted,
                stats.temporary_deleted,
                stats.expired_deleted,
                stats.over_cap_deleted,
            ));
        }
        Ok(())
    }
}
