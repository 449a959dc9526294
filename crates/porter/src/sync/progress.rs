//! Progress events emitted while a migration runs.
//!
//! The engine never prints. It reports through an optional callback and the
//! CLI decides whether that becomes progress bars or log lines.

use crate::kind::EntityKind;

/// Progress events emitted during a migration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum MigrationEvent {
    /// A stage is about to process records.
    StageStarted {
        kind: EntityKind,
        /// Entries already present in the stage's ledger.
        existing: usize,
    },

    /// A stage was not run.
    StageSkipped { kind: EntityKind, reason: String },

    /// Fetched a page of source records.
    FetchedPage {
        /// The listing this page belongs to (e.g. `users`, `issues:OPS`).
        scope: String,
        /// Page number (1-indexed).
        page: u32,
        count: usize,
        total_so_far: usize,
    },

    /// A page fetch failed; the scope was abandoned.
    FetchFailed {
        scope: String,
        page: u32,
        error: String,
    },

    /// The ledger already had the record.
    RecordSkipped { kind: EntityKind, source_id: String },

    /// The record was created on the target.
    RecordCreated {
        kind: EntityKind,
        source_id: String,
        target_id: String,
    },

    /// The target already had the record and it was found again.
    RecordLocated {
        kind: EntityKind,
        source_id: String,
        target_id: String,
    },

    /// The record could not be migrated.
    RecordFailed {
        kind: EntityKind,
        source_id: String,
        error: String,
    },

    /// Backing off before retrying a transient failure.
    RetryBackoff {
        kind: EntityKind,
        source_id: String,
        retry_after_ms: u64,
        attempt: u32,
        error: String,
    },

    /// A non-fatal problem (missing comment, unknown link type, owner fallback).
    Warning { kind: EntityKind, message: String },

    /// The ledger was flushed.
    Checkpoint { kind: EntityKind, entries: usize },

    /// A stop was requested; the stage flushed and ended early.
    Interrupted { kind: EntityKind },

    /// A stage finished (cleanly or not).
    StageFinished {
        kind: EntityKind,
        created: usize,
        located: usize,
        skipped: usize,
        errors: usize,
    },
}

/// Callback invoked for every [`MigrationEvent`].
pub type EventCallback = Box<dyn Fn(MigrationEvent) + Send + Sync>;

/// Emit an event to the callback, if there is one.
#[inline]
pub fn emit(callback: Option<&EventCallback>, event: MigrationEvent) {
    if let Some(cb) = callback {
        cb(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_emit_with_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let callback: EventCallback = Box::new(move |event| {
            seen_clone.lock().unwrap().push(event);
        });

        emit(
            Some(&callback),
            MigrationEvent::Checkpoint {
                kind: EntityKind::Accounts,
                entries: 3,
            },
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(
            seen[0],
            MigrationEvent::Checkpoint {
                kind: EntityKind::Accounts,
                entries: 3
            }
        ));
    }

    #[test]
    fn test_emit_without_callback_is_noop() {
        emit(
            None,
            MigrationEvent::Interrupted {
                kind: EntityKind::Links,
            },
        );
    }
}
