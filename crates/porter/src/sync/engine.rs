//! The per-record create-or-locate loop shared by every entity stage.
//!
//! For each source record a stage:
//!
//! 1. ignores it when a restricted set is configured and excludes it,
//! 2. skips it when the ledger already maps its source id,
//! 3. resolves its upstream references into a target payload,
//! 4. creates it on the target, retrying transient failures,
//! 5. on a conflict, locates the existing target entity instead,
//! 6. records the mapping and checkpoints the ledger every few records.
//!
//! Failures are collected into the [`StageReport`]; only ledger I/O errors
//! abort a stage outright.

use std::future::Future;

use async_trait::async_trait;

use super::fetch::{PageSource, Paginator};
use super::progress::{EventCallback, MigrationEvent, emit};
use super::types::{SyncOptions, StageOutcome, StageReport};
use crate::error::{FetchError, RecordError, RecordErrorClass};
use crate::kind::EntityKind;
use crate::ledger::{LedgerError, MappingLedger, StageMarker};
use crate::platform::RemoteError;
use crate::retry::{RetryTarget, with_retry};

/// A record references an upstream entity that has no mapping yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency(pub String);

/// Per-kind behaviour plugged into [`StageRun`].
#[async_trait]
pub trait EntitySync: Send + Sync {
    type Record: Send + Sync;
    type Payload: Send + Sync;

    fn kind(&self) -> EntityKind;

    /// Natural source id; `None` for a malformed record.
    fn source_id(&self, record: &Self::Record) -> Option<String>;

    /// Resolve references and build the create payload.
    ///
    /// Non-fatal problems go into `notes` and end up as stage warnings.
    async fn prepare(
        &self,
        record: &Self::Record,
        notes: &mut Vec<String>,
    ) -> Result<Self::Payload, MissingDependency>;

    /// Create the entity, returning its target id.
    async fn create(&self, payload: &Self::Payload) -> Result<String, RemoteError>;

    /// Find an entity matching the payload's natural key.
    async fn locate(&self, payload: &Self::Payload) -> Result<Option<String>, RemoteError>;

    /// Look for an existing entity before creating one.
    ///
    /// Needed where the target never answers a duplicate create with a conflict.
    fn probe_before_create(&self) -> bool {
        false
    }

    /// Follow-up work for a freshly created entity.
    async fn after_create(
        &self,
        _record: &Self::Record,
        _target_id: &str,
        _notes: &mut Vec<String>,
    ) {
    }
}

enum Resolution {
    Created(String),
    Located(String),
}

/// One stage's pass over its records, bound to that stage's ledger.
pub struct StageRun<'a> {
    ledger: &'a mut MappingLedger,
    options: &'a SyncOptions,
    on_event: Option<&'a EventCallback>,
    report: StageReport,
    since_checkpoint: usize,
}

impl<'a> StageRun<'a> {
    pub fn new(
        ledger: &'a mut MappingLedger,
        options: &'a SyncOptions,
        on_event: Option<&'a EventCallback>,
    ) -> Self {
        let kind = ledger.kind();
        emit(
            on_event,
            MigrationEvent::StageStarted {
                kind,
                existing: ledger.len(),
            },
        );
        tracing::info!("Starting {} stage ({} already mapped)", kind, ledger.len());
        Self {
            ledger,
            options,
            on_event,
            report: StageReport::new(kind),
            since_checkpoint: 0,
        }
    }

    #[inline]
    pub fn kind(&self) -> EntityKind {
        self.report.kind
    }

    #[inline]
    pub fn ledger(&self) -> &MappingLedger {
        self.ledger
    }

    #[inline]
    pub fn options(&self) -> &'a SyncOptions {
        self.options
    }

    #[inline]
    pub fn on_event(&self) -> Option<&'a EventCallback> {
        self.on_event
    }

    pub fn report_mut(&mut self) -> &mut StageReport {
        &mut self.report
    }

    /// Whether the stage should stop before the next record.
    ///
    /// Observes the stop signal once and turns it into an `Interrupted` outcome.
    pub fn should_stop(&mut self) -> bool {
        if self.report.outcome != StageOutcome::Finished {
            return true;
        }
        if self.options.stop.is_requested() {
            self.report.outcome = StageOutcome::Interrupted;
            tracing::warn!("Stop requested; ending {} stage early", self.kind());
            emit(self.on_event, MigrationEvent::Interrupted { kind: self.kind() });
            return true;
        }
        false
    }

    /// Process every record of one paginated listing.
    pub async fn sync_scope<E, P>(
        &mut self,
        sync: &E,
        mut pager: Paginator<P>,
    ) -> Result<(), LedgerError>
    where
        E: EntitySync + ?Sized,
        P: PageSource<Item = E::Record>,
    {
        while !self.should_stop() {
            let Some(page) = pager.next_page(self.on_event).await else {
                break;
            };
            let records = match page {
                Ok(records) => records,
                Err(e) => {
                    self.scope_failed(&e);
                    break;
                }
            };
            for record in &records {
                if self.should_stop() {
                    break;
                }
                self.sync_record(sync, record).await?;
            }
        }
        Ok(())
    }

    /// Process a single record.
    pub async fn sync_record<E>(&mut self, sync: &E, record: &E::Record) -> Result<(), LedgerError>
    where
        E: EntitySync + ?Sized,
    {
        let kind = self.kind();
        let Some(source_id) = sync.source_id(record) else {
            self.record_error(RecordError::new(
                kind,
                "<unknown>",
                RecordErrorClass::Permanent,
                "source record has no id",
            ));
            return self.tick();
        };

        if !self.options.admits(&source_id) {
            return Ok(());
        }
        if self.ledger.contains(&source_id) {
            self.count_skip(&source_id);
            return Ok(());
        }

        let mut notes = Vec::new();
        let prepared = sync.prepare(record, &mut notes).await;
        self.add_warnings(notes);
        let payload = match prepared {
            Ok(payload) => payload,
            Err(MissingDependency(message)) => {
                self.record_error(RecordError::new(
                    kind,
                    source_id,
                    RecordErrorClass::UnresolvedDependency,
                    message,
                ));
                return self.tick();
            }
        };

        match self.resolve(sync, &source_id, &payload).await {
            Ok(Resolution::Created(target_id)) => {
                self.record_mapping(&source_id, &target_id, true);
                let mut notes = Vec::new();
                sync.after_create(record, &target_id, &mut notes).await;
                self.add_warnings(notes);
            }
            Ok(Resolution::Located(target_id)) => {
                self.record_mapping(&source_id, &target_id, false);
            }
            Err(err) => self.record_error(err),
        }

        self.tick()
    }

    async fn resolve<E>(
        &self,
        sync: &E,
        source_id: &str,
        payload: &E::Payload,
    ) -> Result<Resolution, RecordError>
    where
        E: EntitySync + ?Sized,
    {
        let kind = sync.kind();

        if sync.probe_before_create() {
            match self.retrying(source_id, || sync.locate(payload)).await {
                Ok(Some(target_id)) => return Ok(Resolution::Located(target_id)),
                Ok(None) => {}
                Err(e) => return Err(RecordError::from_remote(kind, source_id, &e)),
            }
        }

        match self.retrying(source_id, || sync.create(payload)).await {
            Ok(target_id) => Ok(Resolution::Created(target_id)),
            Err(conflict) if conflict.is_conflict() => {
                tracing::debug!("{} {} already exists on target; locating", kind, source_id);
                match self.retrying(source_id, || sync.locate(payload)).await {
                    Ok(Some(target_id)) => Ok(Resolution::Located(target_id)),
                    Ok(None) => Err(RecordError::new(
                        kind,
                        source_id,
                        RecordErrorClass::ConflictInconsistency,
                        format!("create reported a conflict but no existing entity matched ({conflict})"),
                    )),
                    Err(e) => Err(RecordError::from_remote(kind, source_id, &e)),
                }
            }
            Err(e) => Err(RecordError::from_remote(kind, source_id, &e)),
        }
    }

    /// Run a remote call under the stage's retry policy.
    pub async fn retrying<T, F, Fut>(&self, source_id: &str, operation: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        with_retry(
            operation,
            RemoteError::is_transient,
            &self.options.retry,
            RetryTarget {
                kind: self.kind(),
                source_id,
            },
            self.on_event,
        )
        .await
    }

    /// Store a mapping and count it as created or located.
    pub fn record_mapping(&mut self, source_id: &str, target_id: &str, created: bool) {
        let kind = self.kind();
        self.ledger.put(source_id, target_id);
        let event = if created {
            self.report.created += 1;
            tracing::debug!("Created {} {} -> {}", kind, source_id, target_id);
            MigrationEvent::RecordCreated {
                kind,
                source_id: source_id.to_string(),
                target_id: target_id.to_string(),
            }
        } else {
            self.report.located += 1;
            tracing::debug!("Located {} {} -> {}", kind, source_id, target_id);
            MigrationEvent::RecordLocated {
                kind,
                source_id: source_id.to_string(),
                target_id: target_id.to_string(),
            }
        };
        emit(self.on_event, event);
    }

    pub fn count_skip(&mut self, source_id: &str) {
        self.report.skipped += 1;
        emit(
            self.on_event,
            MigrationEvent::RecordSkipped {
                kind: self.kind(),
                source_id: source_id.to_string(),
            },
        );
    }

    /// Collect a per-record failure; trips the error threshold if configured.
    pub fn record_error(&mut self, err: RecordError) {
        tracing::warn!("{}", err);
        emit(
            self.on_event,
            MigrationEvent::RecordFailed {
                kind: err.kind,
                source_id: err.source_id.clone(),
                error: format!("{}: {}", err.class, err.message),
            },
        );
        self.report.errors.push(err);

        if let Some(threshold) = self.options.error_threshold
            && self.report.errors.len() > threshold
            && self.report.outcome == StageOutcome::Finished
        {
            tracing::error!(
                "{} stage exceeded its error threshold ({} > {})",
                self.kind(),
                self.report.errors.len(),
                threshold
            );
            self.report.outcome = StageOutcome::ThresholdExceeded;
        }
    }

    /// Abandon a listing after a failed page.
    pub fn scope_failed(&mut self, err: &FetchError) {
        self.report.incomplete_scopes.push(err.scope.clone());
        self.record_error(RecordError::from_fetch(self.kind(), err));
    }

    pub fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        emit(
            self.on_event,
            MigrationEvent::Warning {
                kind: self.kind(),
                message: message.clone(),
            },
        );
        self.report.warnings.push(message);
    }

    fn add_warnings(&mut self, notes: Vec<String>) {
        for note in notes {
            self.warn(note);
        }
    }

    /// Count a processed record and checkpoint when the interval is reached.
    pub fn tick(&mut self) -> Result<(), LedgerError> {
        self.since_checkpoint += 1;
        if self.since_checkpoint >= self.kind().checkpoint_interval() {
            self.checkpoint()?;
        }
        Ok(())
    }

    /// Flush the ledger if it has unsaved mappings.
    pub fn checkpoint(&mut self) -> Result<(), LedgerError> {
        self.since_checkpoint = 0;
        if !self.ledger.is_dirty() {
            return Ok(());
        }
        self.ledger.flush()?;
        emit(
            self.on_event,
            MigrationEvent::Checkpoint {
                kind: self.kind(),
                entries: self.ledger.len(),
            },
        );
        Ok(())
    }

    /// Write the final marker, flush, and hand back the report.
    ///
    /// The marker becomes `completed` only for a clean, unrestricted pass.
    pub fn finish(self) -> Result<StageReport, LedgerError> {
        let Self {
            ledger,
            options,
            on_event,
            report,
            ..
        } = self;

        let marker = match report.outcome {
            StageOutcome::ThresholdExceeded => StageMarker::Failed,
            _ if options.only.is_some() => ledger.marker(),
            _ if report.is_clean() => StageMarker::Completed,
            _ => StageMarker::InProgress,
        };
        ledger.set_marker(marker);
        ledger.flush()?;

        tracing::info!(
            "Finished {} stage: {} created, {} located, {} skipped, {} errors",
            report.kind,
            report.created,
            report.located,
            report.skipped,
            report.errors.len()
        );
        emit(
            on_event,
            MigrationEvent::StageFinished {
                kind: report.kind,
                created: report.created,
                located: report.located,
                skipped: report.skipped,
                errors: report.errors.len(),
            },
        );
        Ok(report)
    }
}
