//! Work-items stage: source issues become target work items.
//!
//! Issues are enumerated queue by queue. An issue whose queue has no project
//! mapping is an unresolved dependency, not a reason to stop.

use std::collections::BTreeMap;
use std::future::Future;

use async_trait::async_trait;

use super::engine::{EntitySync, MissingDependency, StageRun};
use super::fetch::{IssuePages, Paginator, QueuePages};
use super::progress::EventCallback;
use super::types::{StageReport, SyncOptions};
use crate::kind::EntityKind;
use crate::ledger::{LedgerError, MappingLedger};
use crate::platform::{
    NewWorkItem, RemoteError, SourceApi, SourceComment, SourceIssue, TargetApi, UserRef,
};
use crate::retry::{RetryConfig, RetryTarget, with_retry};

const UNKNOWN: &str = "Unknown";

/// The provenance line that identifies a migrated work item.
pub fn provenance_marker(issue_key: &str) -> String {
    format!("**Original issue:** {issue_key}")
}

/// Whether `description` carries the provenance line for `marker` on its own line.
pub fn has_marker(description: &str, marker: &str) -> bool {
    description.lines().any(|line| line.trim() == marker)
}

fn display(user: Option<&UserRef>) -> String {
    user.and_then(UserRef::label)
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Description for the target work item: the source text plus a provenance block.
pub fn work_item_description(issue: &SourceIssue) -> String {
    let mut text = issue.description.clone().unwrap_or_default();
    text.push_str("\n\n---\n");
    text.push_str(&provenance_marker(&issue.key));
    text.push('\n');
    text.push_str(&format!("**Author:** {}\n", display(issue.created_by.as_ref())));
    text.push_str(&format!(
        "**Created:** {}\n",
        issue.created_at.as_deref().unwrap_or_default()
    ));
    if issue.assignee.is_some() {
        text.push_str(&format!("**Assignee:** {}\n", display(issue.assignee.as_ref())));
    }
    text
}

/// Comment text for the target, carrying the original author and date.
pub fn comment_text(comment: &SourceComment) -> String {
    format!(
        "**Author:** {}\n**Date:** {}\n\n{}",
        display(comment.created_by.as_ref()),
        comment.created_at.as_deref().unwrap_or_default(),
        comment.text.as_deref().unwrap_or_default()
    )
}

/// Creates or locates one target work item per source issue.
pub struct WorkItemSync<'a, S: ?Sized, T: ?Sized> {
    source: &'a S,
    target: &'a T,
    /// Source queue key → target project id.
    projects: BTreeMap<String, String>,
    migrate_comments: bool,
    probe: bool,
    retry: RetryConfig,
    on_event: Option<&'a EventCallback>,
}

impl<'a, S, T> WorkItemSync<'a, S, T>
where
    S: SourceApi + ?Sized,
    T: TargetApi + ?Sized,
{
    pub fn new(
        source: &'a S,
        target: &'a T,
        projects: &MappingLedger,
        options: &SyncOptions,
        on_event: Option<&'a EventCallback>,
    ) -> Self {
        Self {
            source,
            target,
            projects: projects.mappings().clone(),
            migrate_comments: options.migrate_comments,
            probe: options.probe_work_items,
            retry: options.retry.clone(),
            on_event,
        }
    }

    /// Comment calls share the stage's retry budget, attributed to the issue.
    async fn retrying<R, F, Fut>(&self, issue_key: &str, operation: F) -> Result<R, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, RemoteError>>,
    {
        with_retry(
            operation,
            RemoteError::is_transient,
            &self.retry,
            RetryTarget {
                kind: EntityKind::WorkItems,
                source_id: issue_key,
            },
            self.on_event,
        )
        .await
    }
}

#[async_trait]
impl<S, T> EntitySync for WorkItemSync<'_, S, T>
where
    S: SourceApi + ?Sized,
    T: TargetApi + ?Sized,
{
    type Record = SourceIssue;
    type Payload = NewWorkItem;

    fn kind(&self) -> EntityKind {
        EntityKind::WorkItems
    }

    fn source_id(&self, issue: &SourceIssue) -> Option<String> {
        Some(issue.key.clone()).filter(|k| !k.is_empty())
    }

    async fn prepare(
        &self,
        issue: &SourceIssue,
        _notes: &mut Vec<String>,
    ) -> Result<NewWorkItem, MissingDependency> {
        let queue = issue.queue_key();
        let project_id = self.projects.get(queue).ok_or_else(|| {
            MissingDependency(format!("project {queue} has not been migrated"))
        })?;
        Ok(NewWorkItem {
            project_id: project_id.clone(),
            project_short_name: queue.to_string(),
            summary: issue
                .summary
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| issue.key.clone()),
            description: work_item_description(issue),
            marker: provenance_marker(&issue.key),
        })
    }

    async fn create(&self, item: &NewWorkItem) -> Result<String, RemoteError> {
        self.target.create_work_item(item).await
    }

    async fn locate(&self, item: &NewWorkItem) -> Result<Option<String>, RemoteError> {
        self.target
            .find_work_item(&item.project_short_name, &item.marker)
            .await
    }

    fn probe_before_create(&self) -> bool {
        self.probe
    }

    async fn after_create(&self, issue: &SourceIssue, item_id: &str, notes: &mut Vec<String>) {
        if !self.migrate_comments {
            return;
        }
        let comments = match self
            .retrying(&issue.key, || self.source.list_comments(&issue.key))
            .await
        {
            Ok(comments) => comments,
            Err(e) => {
                notes.push(format!("Could not read comments of {}: {e}", issue.key));
                return;
            }
        };
        for (index, comment) in comments.iter().enumerate() {
            let text = comment_text(comment);
            let copied = self
                .retrying(&issue.key, || self.target.add_comment(item_id, &text))
                .await;
            if let Err(e) = copied {
                notes.push(format!(
                    "Could not copy comment {} of {}: {e}",
                    index + 1,
                    issue.key
                ));
            }
        }
    }
}

/// Run the work-items stage against `ledger`.
pub async fn sync_work_items<S, T>(
    source: &S,
    target: &T,
    projects: &MappingLedger,
    ledger: &mut MappingLedger,
    options: &SyncOptions,
    on_event: Option<&EventCallback>,
) -> Result<StageReport, LedgerError>
where
    S: SourceApi + ?Sized,
    T: TargetApi + ?Sized,
{
    let sync = WorkItemSync::new(source, target, projects, options, on_event);
    let mut run = StageRun::new(ledger, options, on_event);

    let mut queues = Paginator::new(QueuePages::new(source), options.page_size);
    'queues: while !run.should_stop() {
        let Some(page) = queues.next_page(on_event).await else {
            break;
        };
        let page = match page {
            Ok(page) => page,
            Err(e) => {
                run.scope_failed(&e);
                break;
            }
        };
        for queue in &page {
            if run.should_stop() {
                break 'queues;
            }
            if queue.key.is_empty() {
                run.warn("Skipping a source queue without a key".to_string());
                continue;
            }
            let issues = Paginator::new(IssuePages::new(source, &queue.key), options.page_size);
            run.sync_scope(&sync, issues).await?;
        }
    }

    run.finish()
}
