use porter::MigrationEvent;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: MigrationEvent) {
        match event {
            MigrationEvent::StageStarted { kind, existing } => {
                tracing::info!(stage = %kind, existing, "Stage started");
            }

            MigrationEvent::StageSkipped { kind, reason } => {
                tracing::info!(stage = %kind, reason = %reason, "Stage skipped");
            }

            MigrationEvent::FetchedPage {
                scope,
                page,
                count,
                total_so_far,
            } => {
                tracing::debug!(scope = %scope, page, count, total_so_far, "Fetched page");
            }

            MigrationEvent::FetchFailed { scope, page, error } => {
                tracing::warn!(scope = %scope, page, error = %error, "Page fetch failed, listing abandoned");
            }

            MigrationEvent::RecordSkipped { kind, source_id } => {
                tracing::trace!(stage = %kind, source_id = %source_id, "Already mapped");
            }

            MigrationEvent::RecordCreated {
                kind,
                source_id,
                target_id,
            } => {
                tracing::info!(stage = %kind, source_id = %source_id, target_id = %target_id, "Created");
            }

            MigrationEvent::RecordLocated {
                kind,
                source_id,
                target_id,
            } => {
                tracing::info!(stage = %kind, source_id = %source_id, target_id = %target_id, "Found existing");
            }

            MigrationEvent::RecordFailed {
                kind,
                source_id,
                error,
            } => {
                tracing::warn!(stage = %kind, source_id = %source_id, error = %error, "Failed to migrate");
            }

            MigrationEvent::RetryBackoff {
                kind,
                source_id,
                retry_after_ms,
                attempt,
                error,
            } => {
                tracing::warn!(
                    stage = %kind,
                    source_id = %source_id,
                    retry_after_ms,
                    attempt,
                    error = %error,
                    "Transient failure, backing off"
                );
            }

            MigrationEvent::Warning { kind, message } => {
                tracing::warn!(stage = %kind, message = %message, "Warning");
            }

            MigrationEvent::Checkpoint { kind, entries } => {
                tracing::debug!(stage = %kind, entries, "Ledger saved");
            }

            MigrationEvent::Interrupted { kind } => {
                tracing::warn!(stage = %kind, "Stage interrupted, progress saved");
            }

            MigrationEvent::StageFinished {
                kind,
                created,
                located,
                skipped,
                errors,
            } => {
                tracing::info!(stage = %kind, created, located, skipped, errors, "Stage finished");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
