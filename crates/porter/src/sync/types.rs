//! Options and results shared by all stages.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::fetch::DEFAULT_PAGE_SIZE;
use crate::error::RecordError;
use crate::kind::EntityKind;
use crate::retry::RetryConfig;

/// Cooperative stop flag, checked between records.
///
/// Cloning shares the flag, so a signal handler can hold one clone while the
/// engine polls another.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running stage to flush and stop after the current record.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for running stages.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Records requested per source page.
    pub page_size: u32,
    /// Retry policy for transient remote failures.
    pub retry: RetryConfig,
    /// Abort a stage once it has collected more errors than this.
    pub error_threshold: Option<usize>,
    /// Copy comments onto newly created work items.
    pub migrate_comments: bool,
    /// Copy queue statuses onto newly created projects.
    pub migrate_statuses: bool,
    /// Search the target for a work item before creating it.
    pub probe_work_items: bool,
    /// Restrict the run to these source ids (keys for projects and work items).
    pub only: Option<BTreeSet<String>>,
    pub stop: StopSignal,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryConfig::default(),
            error_threshold: None,
            migrate_comments: true,
            migrate_statuses: true,
            probe_work_items: true,
            only: None,
            stop: StopSignal::new(),
        }
    }
}

impl SyncOptions {
    /// Whether `source_id` is inside the restricted set (always true without one).
    pub fn admits(&self, source_id: &str) -> bool {
        self.only
            .as_ref()
            .is_none_or(|only| only.contains(source_id))
    }
}

/// How a stage ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StageOutcome {
    /// Every record was visited.
    #[default]
    Finished,
    /// A stop was requested before the end.
    Interrupted,
    /// More errors than the configured threshold.
    ThresholdExceeded,
}

/// Link-stage specific counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Links reported by the source, counting each side separately.
    pub found: usize,
    /// Links whose other end has no work-item mapping.
    pub unresolved: usize,
    /// Links already created in this run or a previous one.
    pub duplicates: usize,
    /// Source type keys missing from the type table.
    pub unknown_types: BTreeSet<String>,
    /// Created links per target type name.
    pub by_type: BTreeMap<String, usize>,
}

/// Result of running one stage.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub kind: EntityKind,
    /// Records created on the target.
    pub created: usize,
    /// Records that already existed on the target and were found again.
    pub located: usize,
    /// Records skipped because the ledger already had them.
    pub skipped: usize,
    /// Per-record failures (non-fatal).
    pub errors: Vec<RecordError>,
    /// Problems that did not prevent a record from migrating.
    pub warnings: Vec<String>,
    /// Listings abandoned after a failed page.
    pub incomplete_scopes: Vec<String>,
    pub outcome: StageOutcome,
    pub links: Option<LinkStats>,
}

impl StageReport {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            created: 0,
            located: 0,
            skipped: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            incomplete_scopes: Vec::new(),
            outcome: StageOutcome::Finished,
            links: None,
        }
    }

    /// Records that now have a mapping thanks to this run.
    pub fn migrated(&self) -> usize {
        self.created + self.located
    }

    /// Links whose other end was not migrated yet; a later run can still
    /// create them.
    pub fn deferred_links(&self) -> usize {
        self.links.as_ref().map_or(0, |links| links.unresolved)
    }

    /// Finished, with no errors, no abandoned listings and nothing deferred.
    pub fn is_clean(&self) -> bool {
        self.outcome == StageOutcome::Finished
            && self.errors.is_empty()
            && self.incomplete_scopes.is_empty()
            && self.deferred_links() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordErrorClass;

    #[test]
    fn test_sync_options_default() {
        let options = SyncOptions::default();
        assert_eq!(options.page_size, DEFAULT_PAGE_SIZE);
        assert!(options.migrate_comments);
        assert!(options.migrate_statuses);
        assert!(options.probe_work_items);
        assert!(options.error_threshold.is_none());
        assert!(options.only.is_none());
        assert!(!options.stop.is_requested());
    }

    #[test]
    fn test_admits_respects_restricted_set() {
        let mut options = SyncOptions::default();
        assert!(options.admits("anything"));

        options.only = Some(["OPS-1".to_string()].into_iter().collect());
        assert!(options.admits("OPS-1"));
        assert!(!options.admits("OPS-2"));
    }

    #[test]
    fn test_stop_signal_is_shared_between_clones() {
        let signal = StopSignal::new();
        let clone = signal.clone();
        clone.request();
        assert!(signal.is_requested());
    }

    #[test]
    fn test_stage_report_cleanliness() {
        let mut report = StageReport::new(EntityKind::Accounts);
        report.created = 2;
        report.located = 1;
        assert_eq!(report.migrated(), 3);
        assert!(report.is_clean());

        report.incomplete_scopes.push("users".into());
        assert!(!report.is_clean());

        report.incomplete_scopes.clear();
        report.errors.push(RecordError::new(
            EntityKind::Accounts,
            "7",
            RecordErrorClass::Permanent,
            "rejected",
        ));
        assert!(!report.is_clean());

        report.errors.clear();
        report.outcome = StageOutcome::Interrupted;
        assert!(!report.is_clean());
    }

    #[test]
    fn test_unresolved_links_keep_report_unclean() {
        let mut report = StageReport::new(EntityKind::Links);
        report.links = Some(LinkStats::default());
        assert!(report.is_clean());

        report.links = Some(LinkStats {
            unresolved: 1,
            ..LinkStats::default()
        });
        assert_eq!(report.deferred_links(), 1);
        assert!(!report.is_clean());
    }
}
