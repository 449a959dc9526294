//! Compare a stage's source listing with its ledger.

use serde::Serialize;

use super::Orchestrator;
use crate::error::MigrationError;
use crate::kind::EntityKind;
use crate::platform::{SourceApi, TargetApi};
use crate::sync::{PageSource, Paginator};
use crate::sync::fetch::{IssuePages, QueuePages, UserPages};

/// Source ids of a stage split by whether the ledger has them.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub kind: EntityKind,
    /// Source records seen.
    pub source_total: usize,
    /// Source records with a ledger entry.
    pub migrated: usize,
    /// Source ids absent from the ledger, in listing order.
    pub pending: Vec<String>,
    /// Listings that could not be read to the end.
    pub incomplete: Vec<String>,
}

impl VerifyReport {
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty() && self.incomplete.is_empty()
    }
}

impl<S, T> Orchestrator<'_, S, T>
where
    S: SourceApi + ?Sized,
    T: TargetApi + ?Sized,
{
    /// Re-list the source scope of `kind` and report the ids still pending.
    ///
    /// Links have no listing of their own and are rejected.
    pub async fn verify(&self, kind: EntityKind) -> Result<VerifyReport, MigrationError> {
        let ledger = self.store.open(kind)?;
        let mut incomplete = Vec::new();

        let ids: Vec<String> = match kind {
            EntityKind::Accounts => {
                let users = self.drain(UserPages::new(self.source), &mut incomplete).await;
                users.iter().filter_map(|u| u.source_id()).collect()
            }
            EntityKind::Projects => {
                let queues = self.drain(QueuePages::new(self.source), &mut incomplete).await;
                queues
                    .into_iter()
                    .map(|q| q.key)
                    .filter(|k| !k.is_empty())
                    .collect()
            }
            EntityKind::WorkItems => {
                let queues = self.drain(QueuePages::new(self.source), &mut incomplete).await;
                let mut keys = Vec::new();
                for queue in queues.iter().filter(|q| !q.key.is_empty()) {
                    let issues = self
                        .drain(IssuePages::new(self.source, &queue.key), &mut incomplete)
                        .await;
                    keys.extend(issues.into_iter().map(|i| i.key).filter(|k| !k.is_empty()));
                }
                keys
            }
            EntityKind::Links => return Err(MigrationError::NotVerifiable(kind)),
        };

        let pending: Vec<String> = ids
            .iter()
            .filter(|id| !ledger.contains(id))
            .cloned()
            .collect();

        tracing::info!(
            "Verified {}: {} of {} migrated, {} pending",
            kind,
            ids.len() - pending.len(),
            ids.len(),
            pending.len()
        );

        Ok(VerifyReport {
            kind,
            source_total: ids.len(),
            migrated: ids.len() - pending.len(),
            pending,
            incomplete,
        })
    }

    async fn drain<P: PageSource>(&self, pages: P, incomplete: &mut Vec<String>) -> Vec<P::Item> {
        let (items, failure) = Paginator::new(pages, self.options.page_size)
            .collect_all(self.on_event)
            .await;
        if let Some(e) = failure {
            tracing::warn!("{}", e);
            incomplete.push(e.scope);
        }
        items
    }
}
