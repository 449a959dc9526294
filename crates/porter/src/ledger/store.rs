use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{LedgerError, MappingLedger, StageMarker};
use crate::kind::EntityKind;

/// Derived progress of one stage, read from its ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl StageState {
    pub fn as_str(self) -> &'static str {
        match self {
            StageState::NotStarted => "not started",
            StageState::InProgress => "in progress",
            StageState::Completed => "completed",
            StageState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status line for one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageStatus {
    pub kind: EntityKind,
    pub state: StageState,
    pub entries: usize,
    pub updated_at: Option<DateTime<Utc>>,
    pub path: PathBuf,
}

/// The directory holding all four ledger files.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    dir: PathBuf,
}

impl LedgerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, kind: EntityKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// Load the ledger for `kind` (empty if it has never been written).
    pub fn open(&self, kind: EntityKind) -> Result<MappingLedger, LedgerError> {
        MappingLedger::load(kind, self.path_for(kind))
    }

    /// Derive a stage's state from its ledger.
    ///
    /// An empty ledger is `NotStarted` whatever its marker says.
    pub fn state(&self, kind: EntityKind) -> Result<StageState, LedgerError> {
        Ok(state_of(&self.open(kind)?))
    }

    /// Status of every stage, in stage order.
    pub fn statuses(&self) -> Result<Vec<StageStatus>, LedgerError> {
        EntityKind::ALL
            .iter()
            .map(|&kind| {
                let ledger = self.open(kind)?;
                Ok(StageStatus {
                    kind,
                    state: state_of(&ledger),
                    entries: ledger.len(),
                    updated_at: ledger.timestamp(),
                    path: ledger.path().to_path_buf(),
                })
            })
            .collect()
    }
}

pub(crate) fn state_of(ledger: &MappingLedger) -> StageState {
    if ledger.is_empty() {
        return StageState::NotStarted;
    }
    match ledger.marker() {
        StageMarker::Completed => StageState::Completed,
        StageMarker::Failed => StageState::Failed,
        StageMarker::InProgress => StageState::InProgress,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fresh_store_reports_not_started() {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::new(dir.path());
        let statuses = store.statuses().unwrap();
        assert_eq!(statuses.len(), 4);
        assert!(statuses.iter().all(|s| s.state == StageState::NotStarted));
        assert!(statuses.iter().all(|s| s.entries == 0 && s.updated_at.is_none()));
    }

    #[test]
    fn test_state_follows_marker_once_non_empty() {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::new(dir.path());

        let mut ledger = store.open(EntityKind::Accounts).unwrap();
        ledger.set_marker(StageMarker::Completed);
        ledger.flush().unwrap();
        assert_eq!(
            store.state(EntityKind::Accounts).unwrap(),
            StageState::NotStarted
        );

        ledger.put("1", "hub-1");
        ledger.set_marker(StageMarker::InProgress);
        ledger.flush().unwrap();
        assert_eq!(
            store.state(EntityKind::Accounts).unwrap(),
            StageState::InProgress
        );

        ledger.set_marker(StageMarker::Completed);
        ledger.flush().unwrap();
        assert_eq!(
            store.state(EntityKind::Accounts).unwrap(),
            StageState::Completed
        );

        ledger.set_marker(StageMarker::Failed);
        ledger.flush().unwrap();
        assert_eq!(store.state(EntityKind::Accounts).unwrap(), StageState::Failed);
    }

    #[test]
    fn test_paths_are_under_store_dir() {
        let store = LedgerStore::new("/var/lib/porter");
        assert_eq!(
            store.path_for(EntityKind::Projects),
            PathBuf::from("/var/lib/porter/project_mapping.json")
        );
    }
}
