//! List command - show reports in the spool

use std::time::SystemTime;

use anyhow::Result;
use clap::Args;
use crashspool_core::config::Config;

use crate::output::{format_age, Output};

use super::open_store;

#[derive(Debug, Args)]
pub struct ListCommand {
    /// Include uploaded and temporary reports
    #[arg(long)]
    pub all: bool,
}

impl ListCommand {
    pub fn execute(&self, config: &Config, out: &Output) -> Result<()> {
        let store = open_store(config);
        let reports: Vec<_> = store
            .list_reports()?
            .into_iter()
            .filter(|report| {
                let state = report.name().state();
                self.all || !(state.is_terminal() || state.label() == "temporary")
            })
            .collect();

        if out.is_json() {
            let entries: Vec<_> = reports
                .iter()
                .map(|report| {
                    serde_json::json!({
                        "local_id": report.local_id(),
                        "owner": report.name().owner().map(|o| o.value()),
                        "state": report.name().state().label(),
                        "attempts": report.name().attempts(),
                        "age_secs": age_secs(report.modified()),
                    })
                })
                .collect();
            out.print_json(&serde_json::Value::Array(entries));
            return Ok(());
        }

        if reports.is_empty() {
            println!("No reports in {}", store.dir().display());
            return Ok(());
        }

        println!(
            "{:<38} {:>7} {:<10} {:>8} {:>6}",
            "LOCAL ID", "OWNER", "STATE", "ATTEMPTS", "AGE"
        );
        for report in &reports {
            println!(
                "{:<38} {:>7} {:<10} {:>8} {:>6}",
                report.local_id(),
                report
                    .name()
                    .owner()
                    .map(|o| o.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                report.name().state().label(),
                report.name().attempts(),
                format_age(age_secs(report.modified())),
            );
        }
        Ok(())
    }
}

fn age_secs(modified: SystemTime) -> u64 {
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age.as_secs())
        .unwrap_or(0)
}
