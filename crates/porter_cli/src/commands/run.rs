use std::collections::BTreeSet;
use std::sync::Arc;

use console::style;
use porter::sync::LinkStats;
use porter::{
    EntityKind, LedgerStore, Orchestrator, RunReport, StageOutcome, StageReport, StageSelection,
    StopSignal,
};
use serde::Serialize;

use super::connect;
use crate::config::Config;
use crate::progress::ProgressReporter;

/// Record errors printed after the summary table.
const ERROR_PREVIEW: usize = 20;

#[derive(Debug, Clone, Serialize, tabled::Tabled)]
pub(crate) struct StageRow {
    #[tabled(rename = "Stage")]
    pub stage: String,
    #[tabled(rename = "Created")]
    pub created: usize,
    #[tabled(rename = "Found")]
    pub located: usize,
    #[tabled(rename = "Skipped")]
    pub skipped: usize,
    #[tabled(rename = "Errors")]
    pub errors: usize,
    #[tabled(rename = "Result")]
    pub result: String,
}

fn outcome_label(report: &StageReport) -> &'static str {
    match report.outcome {
        StageOutcome::Interrupted => "interrupted",
        StageOutcome::ThresholdExceeded => "failed (error threshold)",
        StageOutcome::Finished if report.is_clean() => "completed",
        StageOutcome::Finished
            if report.errors.is_empty() && report.incomplete_scopes.is_empty() =>
        {
            "links deferred"
        }
        StageOutcome::Finished => "finished with errors",
    }
}

impl From<&StageReport> for StageRow {
    fn from(report: &StageReport) -> Self {
        Self {
            stage: report.kind.to_string(),
            created: report.created,
            located: report.located,
            skipped: report.skipped,
            errors: report.errors.len(),
            result: outcome_label(report).to_string(),
        }
    }
}

/// One line per link statistic worth showing.
fn link_summary(stats: &LinkStats) -> Vec<String> {
    let mut lines = vec![format!(
        "Links: {} listed, {} unresolved, {} duplicates",
        stats.found, stats.unresolved, stats.duplicates
    )];
    for (name, count) in &stats.by_type {
        lines.push(format!("  {name}: {count} created"));
    }
    if !stats.unknown_types.is_empty() {
        let keys: Vec<&str> = stats.unknown_types.iter().map(String::as_str).collect();
        lines.push(format!("  migrated as Relates: {}", keys.join(", ")));
    }
    lines
}

fn selection(stage: Option<EntityKind>) -> StageSelection {
    stage.map_or(StageSelection::All, StageSelection::Only)
}

fn restricted_ids(only: Vec<String>) -> Option<BTreeSet<String>> {
    let ids: BTreeSet<String> = only
        .into_iter()
        .flat_map(|arg| {
            arg.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect::<Vec<_>>()
        })
        .collect();
    (!ids.is_empty()).then_some(ids)
}

fn print_summary(report: &RunReport) {
    println!();
    println!(
        "{}",
        super::render_table(report.stages.iter().map(StageRow::from))
    );

    for kind in &report.skipped {
        println!("{} {} (already completed)", style("Skipped").dim(), kind);
    }

    for stats in report.stages.iter().filter_map(|s| s.links.as_ref()) {
        for line in link_summary(stats) {
            println!("{line}");
        }
    }

    let errors: Vec<_> = report.stages.iter().flat_map(|s| &s.errors).collect();
    if !errors.is_empty() {
        println!();
        println!("{}", style(format!("{} record(s) failed:", errors.len())).yellow());
        for err in errors.iter().take(ERROR_PREVIEW) {
            println!("  {err}");
        }
        if errors.len() > ERROR_PREVIEW {
            println!("  ... and {} more", errors.len() - ERROR_PREVIEW);
        }
    }

    let incomplete: Vec<&String> = report
        .stages
        .iter()
        .flat_map(|s| &s.incomplete_scopes)
        .collect();
    if !incomplete.is_empty() {
        let scopes: Vec<&str> = incomplete.iter().map(|s| s.as_str()).collect();
        println!(
            "{} {}",
            style("Listings not read to the end:").yellow(),
            scopes.join(", ")
        );
    }
}

/// Run the selected stages and print a summary.
pub(crate) async fn handle_run(
    config: &Config,
    stage: Option<EntityKind>,
    resume: bool,
    only: Vec<String>,
    stop: StopSignal,
) -> Result<(), Box<dyn std::error::Error>> {
    let (source, target) = connect(config)?;

    let mut options = config.sync_options();
    options.only = restricted_ids(only);
    options.stop = stop;

    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();
    let orchestrator = Orchestrator::new(
        &source,
        &target,
        LedgerStore::new(config.state_dir()),
        options,
    )
    .with_events(&callback);

    let me = orchestrator.check_connection().await?;
    tracing::info!(
        "Connected to {} as {}",
        target.base_url(),
        me.login.as_deref().unwrap_or(&me.id)
    );

    let result = orchestrator.run(selection(stage), resume).await;
    reporter.finish();
    let report = result?;

    print_summary(&report);

    match report.halted {
        Some(kind) => {
            let halted = report.stages.iter().find(|s| s.kind == kind);
            if halted.is_some_and(|s| s.outcome == StageOutcome::ThresholdExceeded) {
                return Err(format!(
                    "{kind} stage stopped after exceeding the error threshold"
                )
                .into());
            }
            println!(
                "{} Progress saved; continue with `porter run --resume`.",
                style("Interrupted.").yellow()
            );
        }
        None if report.is_clean() => {
            println!("{}", style("Migration complete.").green().bold());
        }
        None if report.total_errors() == 0 => {
            println!(
                "Finished; some links wait for their other end. Re-run with `--resume` to create them."
            );
        }
        None => {
            println!(
                "Finished with {} error(s). Re-run to retry; `porter verify` lists what is missing.",
                report.total_errors()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use porter::{RecordError, RecordErrorClass};

    use super::*;

    #[test]
    fn selection_defaults_to_all() {
        assert_eq!(selection(None), StageSelection::All);
        assert_eq!(
            selection(Some(EntityKind::Links)),
            StageSelection::Only(EntityKind::Links)
        );
    }

    #[test]
    fn restricted_ids_accepts_repeats_and_commas() {
        assert!(restricted_ids(Vec::new()).is_none());
        assert!(restricted_ids(vec![" , ".into()]).is_none());

        let ids = restricted_ids(vec!["OPS-1,OPS-2".into(), "WEB-1".into(), "OPS-1".into()])
            .unwrap();
        assert_eq!(
            ids.into_iter().collect::<Vec<_>>(),
            vec!["OPS-1", "OPS-2", "WEB-1"]
        );
    }

    #[test]
    fn stage_row_labels_outcome() {
        let mut report = StageReport::new(EntityKind::Projects);
        report.created = 3;
        assert_eq!(StageRow::from(&report).result, "completed");

        report.errors.push(RecordError::new(
            EntityKind::Projects,
            "OPS",
            RecordErrorClass::Permanent,
            "rejected",
        ));
        let row = StageRow::from(&report);
        assert_eq!(row.errors, 1);
        assert_eq!(row.result, "finished with errors");

        report.outcome = StageOutcome::ThresholdExceeded;
        assert_eq!(StageRow::from(&report).result, "failed (error threshold)");

        report.outcome = StageOutcome::Interrupted;
        assert_eq!(StageRow::from(&report).result, "interrupted");
    }

    #[test]
    fn stage_row_labels_deferred_links() {
        let mut report = StageReport::new(EntityKind::Links);
        report.links = Some(LinkStats {
            found: 2,
            unresolved: 1,
            ..LinkStats::default()
        });
        assert_eq!(StageRow::from(&report).result, "links deferred");
    }

    #[test]
    fn link_summary_lists_types_and_unknown_keys() {
        let mut stats = LinkStats {
            found: 6,
            unresolved: 1,
            duplicates: 2,
            ..LinkStats::default()
        };
        stats.by_type.insert("Relates".into(), 3);
        stats.unknown_types.insert("blocks-ish".into());

        let lines = link_summary(&stats);
        assert_eq!(lines[0], "Links: 6 listed, 1 unresolved, 2 duplicates");
        assert!(lines.contains(&"  Relates: 3 created".to_string()));
        assert!(lines.contains(&"  migrated as Relates: blocks-ish".to_string()));
    }
}
