use porter::{EntityKind, LedgerStore, Orchestrator, VerifyReport};
use serde::Serialize;

use super::{OutputFormat, connect, print_json, render_table};
use crate::config::Config;

/// Pending ids listed per stage in table mode.
const PENDING_PREVIEW: usize = 10;

#[derive(Debug, Clone, Serialize, tabled::Tabled)]
pub(crate) struct VerifyRow {
    #[tabled(rename = "Stage")]
    pub stage: String,
    #[tabled(rename = "Source")]
    pub source_total: usize,
    #[tabled(rename = "Migrated")]
    pub migrated: usize,
    #[tabled(rename = "Pending")]
    pub pending: usize,
    #[tabled(rename = "Incomplete Listings")]
    pub incomplete: String,
}

impl From<&VerifyReport> for VerifyRow {
    fn from(report: &VerifyReport) -> Self {
        Self {
            stage: report.kind.to_string(),
            source_total: report.source_total,
            migrated: report.migrated,
            pending: report.pending.len(),
            incomplete: if report.incomplete.is_empty() {
                "-".to_string()
            } else {
                report.incomplete.join(", ")
            },
        }
    }
}

/// Stages that can be checked against a source listing.
fn stages_to_verify(stage: Option<EntityKind>) -> Vec<EntityKind> {
    match stage {
        Some(kind) => vec![kind],
        None => EntityKind::ALL
            .into_iter()
            .filter(|k| *k != EntityKind::Links)
            .collect(),
    }
}

fn pending_preview(report: &VerifyReport) -> Option<String> {
    if report.pending.is_empty() {
        return None;
    }
    let shown: Vec<&str> = report
        .pending
        .iter()
        .take(PENDING_PREVIEW)
        .map(String::as_str)
        .collect();
    let more = report.pending.len().saturating_sub(PENDING_PREVIEW);
    let mut line = format!("{} pending: {}", report.kind, shown.join(", "));
    if more > 0 {
        line.push_str(&format!(" (+{more} more)"));
    }
    Some(line)
}

/// Re-list the source and report which records have no mapping yet.
pub(crate) async fn handle_verify(
    config: &Config,
    stage: Option<EntityKind>,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let (source, target) = connect(config)?;
    let orchestrator = Orchestrator::new(
        &source,
        &target,
        LedgerStore::new(config.state_dir()),
        config.sync_options(),
    );

    let mut reports = Vec::new();
    for kind in stages_to_verify(stage) {
        tracing::debug!("Verifying {} stage", kind);
        reports.push(orchestrator.verify(kind).await?);
    }

    match output {
        OutputFormat::Table => {
            println!("{}", render_table(reports.iter().map(VerifyRow::from)));
            for line in reports.iter().filter_map(pending_preview) {
                println!("{line}");
            }
            if reports.iter().all(VerifyReport::is_complete) {
                println!("Every source record has a mapping.");
            } else {
                println!("Run `porter run --stage <stage> --only <id>...` to retry pending records.");
            }
        }
        OutputFormat::Json => print_json(&reports)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(pending: usize, incomplete: &[&str]) -> VerifyReport {
        VerifyReport {
            kind: EntityKind::WorkItems,
            source_total: 20,
            migrated: 20 - pending,
            pending: (1..=pending).map(|n| format!("OPS-{n}")).collect(),
            incomplete: incomplete.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn default_selection_skips_links() {
        assert_eq!(
            stages_to_verify(None),
            vec![EntityKind::Accounts, EntityKind::Projects, EntityKind::WorkItems]
        );
        assert_eq!(stages_to_verify(Some(EntityKind::Links)), vec![EntityKind::Links]);
    }

    #[test]
    fn row_summarizes_report() {
        let row = VerifyRow::from(&report(2, &["issues:WEB"]));
        assert_eq!(row.stage, "work-items");
        assert_eq!(row.migrated, 18);
        assert_eq!(row.pending, 2);
        assert_eq!(row.incomplete, "issues:WEB");

        assert_eq!(VerifyRow::from(&report(0, &[])).incomplete, "-");
    }

    #[test]
    fn pending_preview_truncates() {
        assert!(pending_preview(&report(0, &[])).is_none());
        assert_eq!(
            pending_preview(&report(2, &[])).unwrap(),
            "work-items pending: OPS-1, OPS-2"
        );
        let long = pending_preview(&report(13, &[])).unwrap();
        assert!(long.contains("OPS-10"));
        assert!(!long.contains("OPS-11"));
        assert!(long.ends_with("(+3 more)"));
    }
}
