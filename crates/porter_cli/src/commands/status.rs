use chrono::{DateTime, Utc};
use porter::{LedgerStore, StageStatus};
use serde::Serialize;

use super::{OutputFormat, print_json, render_table};
use crate::config::Config;

#[derive(Debug, Clone, Serialize, tabled::Tabled)]
pub(crate) struct StatusRow {
    #[tabled(rename = "Stage")]
    pub stage: String,
    #[tabled(rename = "State")]
    pub state: String,
    #[tabled(rename = "Mappings")]
    pub mappings: usize,
    #[tabled(rename = "Last Saved")]
    pub updated: String,
    #[tabled(rename = "File")]
    pub file: String,
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

impl From<&StageStatus> for StatusRow {
    fn from(status: &StageStatus) -> Self {
        Self {
            stage: status.kind.to_string(),
            state: status.state.to_string(),
            mappings: status.entries,
            updated: format_time(status.updated_at),
            file: status.path.display().to_string(),
        }
    }
}

/// Show per-stage progress read from the ledger files. No network access.
pub(crate) fn handle_status(
    config: &Config,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = LedgerStore::new(config.state_dir());
    let statuses = store.statuses()?;

    match output {
        OutputFormat::Table => {
            println!("{}", render_table(statuses.iter().map(StatusRow::from)));
        }
        OutputFormat::Json => print_json(&statuses)?,
    }
    Ok(())
}
