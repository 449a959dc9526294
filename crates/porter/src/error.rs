//! Error types shared by the engine and the orchestrator.

use std::fmt;

use thiserror::Error;

use crate::kind::EntityKind;
use crate::ledger::LedgerError;
use crate::platform::RemoteError;

/// Errors that stop a run (as opposed to per-record failures).
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Stage {stage} requires completed {missing} migration (its ledger is empty)")]
    DependencyNotMet {
        stage: EntityKind,
        missing: EntityKind,
    },

    #[error("Remote check failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Stage {0} has no source listing to verify against")]
    NotVerifiable(EntityKind),
}

/// A failed page fetch. The scope is abandoned after this.
#[derive(Debug, Error)]
#[error("Failed to fetch page {page} of {scope}: {source}")]
pub struct FetchError {
    pub scope: String,
    pub page: u32,
    #[source]
    pub source: RemoteError,
}

/// Why a single record was not migrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordErrorClass {
    /// A page containing records could not be fetched.
    Fetch,
    /// A referenced upstream entity has no mapping.
    UnresolvedDependency,
    /// Create reported a conflict but the existing entity could not be found.
    ConflictInconsistency,
    /// Retries were exhausted.
    Transient,
    /// The target rejected the record.
    Permanent,
}

impl RecordErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordErrorClass::Fetch => "fetch",
            RecordErrorClass::UnresolvedDependency => "unresolved dependency",
            RecordErrorClass::ConflictInconsistency => "conflict inconsistency",
            RecordErrorClass::Transient => "transient",
            RecordErrorClass::Permanent => "permanent",
        }
    }
}

impl fmt::Display for RecordErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-record failure collected in a stage report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} {source_id}: {class}: {message}")]
pub struct RecordError {
    pub kind: EntityKind,
    pub source_id: String,
    pub class: RecordErrorClass,
    pub message: String,
}

impl RecordError {
    pub fn new(
        kind: EntityKind,
        source_id: impl Into<String>,
        class: RecordErrorClass,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            source_id: source_id.into(),
            class,
            message: message.into(),
        }
    }

    /// Classify a remote failure that survived retry.
    pub fn from_remote(kind: EntityKind, source_id: impl Into<String>, err: &RemoteError) -> Self {
        let class = if err.is_transient() {
            RecordErrorClass::Transient
        } else {
            RecordErrorClass::Permanent
        };
        Self::new(kind, source_id, class, err.to_string())
    }

    pub fn from_fetch(kind: EntityKind, err: &FetchError) -> Self {
        Self::new(
            kind,
            err.scope.clone(),
            RecordErrorClass::Fetch,
            err.to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_error_from_remote_classifies() {
        let err = RecordError::from_remote(
            EntityKind::Projects,
            "OPS",
            &RemoteError::api(503, "unavailable"),
        );
        assert_eq!(err.class, RecordErrorClass::Transient);

        let err = RecordError::from_remote(
            EntityKind::Projects,
            "OPS",
            &RemoteError::api(400, "bad shortName"),
        );
        assert_eq!(err.class, RecordErrorClass::Permanent);
        assert!(err.to_string().starts_with("projects OPS: permanent:"));
    }

    #[test]
    fn test_dependency_not_met_message() {
        let err = MigrationError::DependencyNotMet {
            stage: EntityKind::Links,
            missing: EntityKind::WorkItems,
        };
        assert_eq!(
            err.to_string(),
            "Stage links requires completed work-items migration (its ledger is empty)"
        );
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError {
            scope: "issues:OPS".into(),
            page: 3,
            source: RemoteError::network("reset"),
        };
        let record = RecordError::from_fetch(EntityKind::WorkItems, &err);
        assert_eq!(record.class, RecordErrorClass::Fetch);
        assert_eq!(record.source_id, "issues:OPS");
        assert!(record.message.contains("page 3"));
    }
}
