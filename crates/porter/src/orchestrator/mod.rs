//! Runs stages in dependency order against one ledger directory.
//!
//! A stage may only start when every earlier stage's ledger has at least one
//! entry. Upstream stages need not be complete: records whose dependency has
//! no mapping yet are reported per record and picked up by a later pass.
//!
//! # Module Structure
//!
//! - [`verify`] - compares a stage's source listing with its ledger

mod verify;

use crate::error::MigrationError;
use crate::kind::EntityKind;
use crate::ledger::{LedgerStore, StageState, StageStatus};
use crate::platform::{RemoteError, SourceApi, TargetApi, TargetUser};
use crate::retry::{RetryTarget, with_retry};
use crate::sync::{
    EventCallback, MigrationEvent, StageOutcome, StageReport, SyncOptions, emit, sync_accounts,
    sync_links, sync_projects, sync_work_items,
};

pub use verify::VerifyReport;

/// Which stages a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSelection {
    /// Every stage, in dependency order.
    All,
    /// One named stage.
    Only(EntityKind),
}

impl StageSelection {
    pub fn stages(self) -> &'static [EntityKind] {
        match self {
            StageSelection::All => &EntityKind::ALL,
            StageSelection::Only(kind) => match kind {
                EntityKind::Accounts => &[EntityKind::Accounts],
                EntityKind::Projects => &[EntityKind::Projects],
                EntityKind::WorkItems => &[EntityKind::WorkItems],
                EntityKind::Links => &[EntityKind::Links],
            },
        }
    }
}

/// Result of [`Orchestrator::run`].
#[derive(Debug, Default)]
pub struct RunReport {
    /// Reports of the stages that ran, in order.
    pub stages: Vec<StageReport>,
    /// Stages passed over because `resume` found them completed.
    pub skipped: Vec<EntityKind>,
    /// The stage that stopped the run early, if any.
    pub halted: Option<EntityKind>,
}

impl RunReport {
    pub fn total_errors(&self) -> usize {
        self.stages.iter().map(|s| s.errors.len()).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.halted.is_none() && self.stages.iter().all(StageReport::is_clean)
    }
}

/// Sequences the stage synchronizers and persists progress between them.
pub struct Orchestrator<'a, S: ?Sized, T: ?Sized> {
    source: &'a S,
    target: &'a T,
    store: LedgerStore,
    options: SyncOptions,
    on_event: Option<&'a EventCallback>,
}

impl<'a, S, T> Orchestrator<'a, S, T>
where
    S: SourceApi + ?Sized,
    T: TargetApi + ?Sized,
{
    pub fn new(source: &'a S, target: &'a T, store: LedgerStore, options: SyncOptions) -> Self {
        Self {
            source,
            target,
            store,
            options,
            on_event: None,
        }
    }

    /// Report progress through `callback`.
    pub fn with_events(mut self, callback: &'a EventCallback) -> Self {
        self.on_event = Some(callback);
        self
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Confirm the target credentials work before anything is written.
    pub async fn check_connection(&self) -> Result<TargetUser, MigrationError> {
        self.current_user(EntityKind::Accounts)
            .await
            .map_err(|e| MigrationError::Config(format!("target connection check failed: {e}")))
    }

    /// Run the selected stages in order.
    ///
    /// With `resume`, a stage whose ledger carries the completed marker is
    /// skipped. The run stops after a stage that was interrupted or crossed the
    /// error threshold; a stage that finished with recorded errors does not
    /// stop it.
    pub async fn run(
        &self,
        selection: StageSelection,
        resume: bool,
    ) -> Result<RunReport, MigrationError> {
        let mut report = RunReport::default();

        for &kind in selection.stages() {
            if resume && self.store.state(kind)? == StageState::Completed {
                tracing::info!("Skipping {} stage: already completed", kind);
                emit(
                    self.on_event,
                    MigrationEvent::StageSkipped {
                        kind,
                        reason: "already completed".to_string(),
                    },
                );
                report.skipped.push(kind);
                continue;
            }

            let stage = self.run_stage(kind).await?;
            let outcome = stage.outcome;
            report.stages.push(stage);

            match outcome {
                StageOutcome::Finished => {}
                StageOutcome::Interrupted => {
                    tracing::warn!("Run interrupted during {} stage", kind);
                    report.halted = Some(kind);
                    break;
                }
                StageOutcome::ThresholdExceeded => {
                    tracing::error!("{} stage exceeded the error threshold", kind);
                    report.halted = Some(kind);
                    break;
                }
            }
        }

        Ok(report)
    }

    /// Run one stage after checking its prerequisites.
    pub async fn run_stage(&self, kind: EntityKind) -> Result<StageReport, MigrationError> {
        self.check_prerequisites(kind)?;

        let mut ledger = self.store.open(kind)?;
        let options = &self.options;
        let on_event = self.on_event;

        let report = match kind {
            EntityKind::Accounts => {
                sync_accounts(self.source, self.target, &mut ledger, options, on_event).await?
            }
            EntityKind::Projects => {
                let accounts = self.store.open(EntityKind::Accounts)?;
                let owner = self.current_user(EntityKind::Projects).await?;
                sync_projects(
                    self.source,
                    self.target,
                    &accounts,
                    &owner.id,
                    &mut ledger,
                    options,
                    on_event,
                )
                .await?
            }
            EntityKind::WorkItems => {
                let projects = self.store.open(EntityKind::Projects)?;
                sync_work_items(
                    self.source,
                    self.target,
                    &projects,
                    &mut ledger,
                    options,
                    on_event,
                )
                .await?
            }
            EntityKind::Links => {
                let work_items = self.store.open(EntityKind::WorkItems)?;
                sync_links(
                    self.source,
                    self.target,
                    &work_items,
                    &mut ledger,
                    options,
                    on_event,
                )
                .await?
            }
        };

        Ok(report)
    }

    /// Per-stage state derived from the ledger files.
    pub fn status(&self) -> Result<Vec<StageStatus>, MigrationError> {
        Ok(self.store.statuses()?)
    }

    fn check_prerequisites(&self, kind: EntityKind) -> Result<(), MigrationError> {
        for &missing in kind.prerequisites() {
            if self.store.open(missing)?.is_empty() {
                return Err(MigrationError::DependencyNotMet {
                    stage: kind,
                    missing,
                });
            }
        }
        Ok(())
    }

    async fn current_user(&self, kind: EntityKind) -> Result<TargetUser, RemoteError> {
        with_retry(
            || self.target.current_user(),
            RemoteError::is_transient,
            &self.options.retry,
            RetryTarget {
                kind,
                source_id: "current-user",
            },
            self.on_event,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_stages() {
        assert_eq!(StageSelection::All.stages(), &EntityKind::ALL);
        assert_eq!(
            StageSelection::Only(EntityKind::WorkItems).stages(),
            &[EntityKind::WorkItems]
        );
    }

    #[test]
    fn test_run_report_cleanliness() {
        let mut report = RunReport::default();
        assert!(report.is_clean());

        report.stages.push(StageReport::new(EntityKind::Accounts));
        assert!(report.is_clean());

        report.halted = Some(EntityKind::Accounts);
        assert!(!report.is_clean());
        assert_eq!(report.total_errors(), 0);
    }
}
