//! Projects stage: source queues become target projects.
//!
//! Each project needs an owner on the target. The queue lead is followed
//! through the accounts ledger to a hub account, from the hub account to its
//! login, and from the login to the issue-API user. Any break in that chain
//! falls back to the account the target token belongs to.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::engine::{EntitySync, MissingDependency, StageRun};
use super::fetch::{Paginator, QueuePages};
use super::progress::EventCallback;
use super::types::{StageReport, SyncOptions};
use crate::kind::EntityKind;
use crate::ledger::{LedgerError, MappingLedger};
use crate::platform::{
    NewProject, NewStatus, RemoteError, SourceApi, SourceQueue, TargetApi, UserRef,
};

/// Creates or locates one target project per source queue, keyed by short name.
pub struct ProjectSync<'a, S: ?Sized, T: ?Sized> {
    source: &'a S,
    target: &'a T,
    /// Source user id → target hub id.
    accounts: BTreeMap<String, String>,
    default_owner: String,
    migrate_statuses: bool,
    /// Hub id → issue-API id (`None` when the chain could not be followed).
    owners: Mutex<HashMap<String, Option<String>>>,
}

impl<'a, S, T> ProjectSync<'a, S, T>
where
    S: SourceApi + ?Sized,
    T: TargetApi + ?Sized,
{
    pub fn new(
        source: &'a S,
        target: &'a T,
        accounts: &MappingLedger,
        default_owner: impl Into<String>,
        migrate_statuses: bool,
    ) -> Self {
        Self {
            source,
            target,
            accounts: accounts.mappings().clone(),
            default_owner: default_owner.into(),
            migrate_statuses,
            owners: Mutex::new(HashMap::new()),
        }
    }

    /// Issue-API id to use as the project owner.
    async fn resolve_owner(&self, queue: &SourceQueue, notes: &mut Vec<String>) -> String {
        let Some(lead_id) = queue.lead.as_ref().and_then(|l| l.id.as_ref()) else {
            return self.default_owner.clone();
        };
        let lead_id = lead_id.to_string();

        let Some(hub_id) = self.accounts.get(&lead_id) else {
            notes.push(format!(
                "Lead of queue {} ({}) has no migrated account; using default owner",
                queue.key,
                lead_label(queue.lead.as_ref(), &lead_id)
            ));
            return self.default_owner.clone();
        };

        let cached = self
            .owners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(hub_id)
            .cloned();
        let resolved = match cached {
            Some(resolved) => resolved,
            None => {
                let resolved = self.follow_hub_account(hub_id).await;
                self.owners
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(hub_id.clone(), resolved.clone());
                resolved
            }
        };

        resolved.unwrap_or_else(|| {
            notes.push(format!(
                "Could not resolve lead of queue {} to a target user; using default owner",
                queue.key
            ));
            self.default_owner.clone()
        })
    }

    async fn follow_hub_account(&self, hub_id: &str) -> Option<String> {
        let login = match self.target.account_login(hub_id).await {
            Ok(Some(login)) => login,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!("Hub lookup of {} failed: {}", hub_id, e);
                return None;
            }
        };
        match self.target.find_issue_user(&login).await {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!("Issue-API lookup of {} failed: {}", login, e);
                None
            }
        }
    }
}

fn lead_label(lead: Option<&UserRef>, fallback: &str) -> String {
    lead.and_then(UserRef::label)
        .unwrap_or_else(|| fallback.to_string())
}

/// Description for the target project, ending with a provenance line.
pub fn project_description(queue: &SourceQueue) -> String {
    let provenance = format!("Source queue: {}", queue.key);
    match queue.description.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => format!("{text}\n\n{provenance}"),
        _ => provenance,
    }
}

#[async_trait]
impl<S, T> EntitySync for ProjectSync<'_, S, T>
where
    S: SourceApi + ?Sized,
    T: TargetApi + ?Sized,
{
    type Record = SourceQueue;
    type Payload = NewProject;

    fn kind(&self) -> EntityKind {
        EntityKind::Projects
    }

    fn source_id(&self, queue: &SourceQueue) -> Option<String> {
        Some(queue.key.clone()).filter(|k| !k.is_empty())
    }

    async fn prepare(
        &self,
        queue: &SourceQueue,
        notes: &mut Vec<String>,
    ) -> Result<NewProject, MissingDependency> {
        let leader_id = self.resolve_owner(queue, notes).await;
        Ok(NewProject {
            short_name: queue.key.clone(),
            name: queue.name.clone().unwrap_or_else(|| queue.key.clone()),
            description: project_description(queue),
            leader_id,
        })
    }

    async fn create(&self, project: &NewProject) -> Result<String, RemoteError> {
        self.target.create_project(project).await
    }

    async fn locate(&self, project: &NewProject) -> Result<Option<String>, RemoteError> {
        self.target.find_project(&project.short_name).await
    }

    async fn after_create(&self, queue: &SourceQueue, project_id: &str, notes: &mut Vec<String>) {
        if self.migrate_statuses {
            copy_statuses(self.source, self.target, &queue.key, project_id, notes).await;
        }
    }
}

/// Copy queue statuses that the project does not have yet (compared by name).
async fn copy_statuses<S, T>(
    source: &S,
    target: &T,
    queue: &str,
    project_id: &str,
    notes: &mut Vec<String>,
) where
    S: SourceApi + ?Sized,
    T: TargetApi + ?Sized,
{
    let statuses = match source.list_queue_statuses(queue).await {
        Ok(statuses) => statuses,
        Err(e) => {
            notes.push(format!("Could not read statuses of queue {queue}: {e}"));
            return;
        }
    };
    if statuses.is_empty() {
        return;
    }

    let existing: HashSet<String> = match target.list_project_statuses(project_id).await {
        Ok(names) => names.into_iter().map(|n| n.to_lowercase()).collect(),
        Err(e) => {
            notes.push(format!("Could not read statuses of project {queue}: {e}"));
            return;
        }
    };

    for status in &statuses {
        let Some(name) = status.display_name() else {
            continue;
        };
        if existing.contains(&name.to_lowercase()) {
            continue;
        }
        let new_status = NewStatus {
            name: name.to_string(),
            description: status.description.clone(),
        };
        match target.create_project_status(project_id, &new_status).await {
            Ok(()) => tracing::debug!("Added status '{}' to project {}", name, queue),
            Err(e) if e.is_conflict() => {}
            Err(e) => notes.push(format!("Could not add status '{name}' to project {queue}: {e}")),
        }
    }
}

/// Run the projects stage against `ledger`.
///
/// `default_owner` is the issue-API id of the target's authenticated user.
pub async fn sync_projects<S, T>(
    source: &S,
    target: &T,
    accounts: &MappingLedger,
    default_owner: &str,
    ledger: &mut MappingLedger,
    options: &SyncOptions,
    on_event: Option<&EventCallback>,
) -> Result<StageReport, LedgerError>
where
    S: SourceApi + ?Sized,
    T: TargetApi + ?Sized,
{
    let sync = ProjectSync::new(
        source,
        target,
        accounts,
        default_owner,
        options.migrate_statuses,
    );
    let mut run = StageRun::new(ledger, options, on_event);
    let pager = Paginator::new(QueuePages::new(source), options.page_size);
    run.sync_scope(&sync, pager).await?;
    run.finish()
}
