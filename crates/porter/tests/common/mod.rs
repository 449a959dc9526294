//! In-memory source and target used by the integration tests.
//!
//! `FakeTarget` keeps enough state to answer lookups by natural key and
//! rejects duplicate creations with 409, like the real service.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use porter::platform::{
    NewAccount, NewLink, NewProject, NewStatus, NewWorkItem, RemoteError, Result, SourceApi,
    SourceComment, SourceIssue, SourceLink, SourceQueue, SourceStatus, SourceUser, TargetApi,
    TargetLinkType, TargetUser,
};
use porter::retry::RetryConfig;
use porter::sync::SyncOptions;
use porter::sync::work_items::has_marker;

/// Upper bound for any single test run; exceeding it means the engine hung.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Options with instant retries so failing tests stay fast.
pub fn options(page_size: u32) -> SyncOptions {
    SyncOptions {
        page_size,
        retry: RetryConfig::new(Duration::ZERO, 2),
        ..SyncOptions::default()
    }
}

pub fn user(uid: i64, login: &str) -> SourceUser {
    serde_json::from_value(serde_json::json!({
        "uid": uid,
        "login": login,
        "display": login.to_uppercase(),
        "email": format!("{login}@example.com"),
    }))
    .unwrap()
}

pub fn queue(key: &str, lead: Option<i64>) -> SourceQueue {
    let mut value = serde_json::json!({"key": key, "name": format!("Queue {key}")});
    if let Some(id) = lead {
        value["lead"] = serde_json::json!({"id": id.to_string(), "display": "Lead"});
    }
    serde_json::from_value(value).unwrap()
}

pub fn issue(key: &str) -> SourceIssue {
    let queue = key.rsplit_once('-').map_or(key, |(q, _)| q);
    serde_json::from_value(serde_json::json!({
        "key": key,
        "summary": format!("Summary of {key}"),
        "description": "Details",
        "queue": {"key": queue},
        "createdBy": {"id": "1", "display": "Alice"},
        "createdAt": "2024-01-02T03:04:05.000+0000",
    }))
    .unwrap()
}

pub fn link(type_id: &str, direction: &str, other: &str) -> SourceLink {
    serde_json::from_value(serde_json::json!({
        "type": {"id": type_id},
        "direction": direction,
        "object": {"key": other},
    }))
    .unwrap()
}

fn page_of<T: Clone>(items: &[T], page: u32, per_page: u32) -> Vec<T> {
    let start = (page.saturating_sub(1) * per_page) as usize;
    items
        .iter()
        .skip(start)
        .take(per_page as usize)
        .cloned()
        .collect()
}

/// Source system backed by vectors.
#[derive(Default)]
pub struct FakeSource {
    pub users: Vec<SourceUser>,
    pub queues: Vec<SourceQueue>,
    pub issues: BTreeMap<String, Vec<SourceIssue>>,
    pub comments: HashMap<String, Vec<SourceComment>>,
    pub links: HashMap<String, Vec<SourceLink>>,
    pub statuses: HashMap<String, Vec<SourceStatus>>,
    /// Scope → page number that answers with a 500.
    pub failing_pages: HashMap<String, u32>,
    pub requests: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_issues(mut self, queue_key: &str, keys: &[&str]) -> Self {
        if !self.queues.iter().any(|q| q.key == queue_key) {
            self.queues.push(queue(queue_key, None));
        }
        self.issues
            .entry(queue_key.to_string())
            .or_default()
            .extend(keys.iter().map(|k| issue(k)));
        self
    }

    /// Page requests made so far, as `scope#page`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn serve<T: Clone>(&self, scope: &str, items: &[T], page: u32, per_page: u32) -> Result<Vec<T>> {
        self.requests.lock().unwrap().push(format!("{scope}#{page}"));
        if self.failing_pages.get(scope) == Some(&page) {
            return Err(RemoteError::api(500, "backend unavailable"));
        }
        Ok(page_of(items, page, per_page))
    }
}

#[async_trait]
impl SourceApi for FakeSource {
    async fn list_users(&self, page: u32, per_page: u32) -> Result<Vec<SourceUser>> {
        self.serve("users", &self.users, page, per_page)
    }

    async fn list_queues(&self, page: u32, per_page: u32) -> Result<Vec<SourceQueue>> {
        self.serve("queues", &self.queues, page, per_page)
    }

    async fn list_issues(&self, queue: &str, page: u32, per_page: u32) -> Result<Vec<SourceIssue>> {
        let items = self.issues.get(queue).cloned().unwrap_or_default();
        self.serve(&format!("issues:{queue}"), &items, page, per_page)
    }

    async fn list_comments(&self, issue_key: &str) -> Result<Vec<SourceComment>> {
        Ok(self.comments.get(issue_key).cloned().unwrap_or_default())
    }

    async fn list_links(&self, issue_key: &str) -> Result<Vec<SourceLink>> {
        Ok(self.links.get(issue_key).cloned().unwrap_or_default())
    }

    async fn list_queue_statuses(&self, queue: &str) -> Result<Vec<SourceStatus>> {
        Ok(self.statuses.get(queue).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone)]
pub struct FakeWorkItem {
    pub project: String,
    pub summary: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FakeLink {
    pub from: String,
    pub to: String,
    pub type_id: String,
}

#[derive(Default)]
pub struct TargetState {
    next_id: u32,
    /// login → hub id
    pub accounts: BTreeMap<String, String>,
    /// short name → project id
    pub projects: BTreeMap<String, String>,
    pub project_leaders: HashMap<String, String>,
    pub project_statuses: HashMap<String, Vec<String>>,
    /// id → work item
    pub work_items: BTreeMap<String, FakeWorkItem>,
    pub comments: HashMap<String, Vec<String>>,
    pub links: Vec<FakeLink>,
    pub link_types: Vec<TargetLinkType>,
    /// Successful creations of any kind.
    pub creates: usize,
    /// Natural key → statuses returned (in order) before creation succeeds.
    pub scripted: HashMap<String, VecDeque<u16>>,
    /// Natural key → status returned on every creation attempt.
    pub always_fail: HashMap<String, u16>,
    /// Natural keys that lookups pretend not to see.
    pub hidden: HashSet<String>,
    /// Create attempts per natural key.
    pub attempts: HashMap<String, usize>,
}

impl TargetState {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn gate(&mut self, key: &str) -> Result<()> {
        *self.attempts.entry(key.to_string()).or_default() += 1;
        if let Some(status) = self.always_fail.get(key) {
            return Err(RemoteError::api(*status, format!("scripted failure for {key}")));
        }
        if let Some(status) = self.scripted.get_mut(key).and_then(VecDeque::pop_front) {
            return Err(RemoteError::api(status, format!("scripted failure for {key}")));
        }
        Ok(())
    }
}

/// Target system with 409-on-duplicate semantics.
pub struct FakeTarget {
    state: Mutex<TargetState>,
}

impl Default for FakeTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTarget {
    pub const ME: &'static str = "me-0";

    pub fn new() -> Self {
        let link_types = vec![
            link_type("lt-rel", "Relates", false),
            link_type("lt-dep", "Depend", true),
            link_type("lt-dup", "Duplicate", true),
            link_type("lt-sub", "Subtask", true),
        ];
        Self {
            state: Mutex::new(TargetState {
                link_types,
                ..TargetState::default()
            }),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, TargetState> {
        self.state.lock().unwrap()
    }

    pub fn creates(&self) -> usize {
        self.state().creates
    }

    /// An account that exists before the migration starts.
    pub fn seed_account(&self, login: &str) -> String {
        let mut state = self.state();
        let id = state.id("hub");
        state.accounts.insert(login.to_string(), id.clone());
        id
    }

    pub fn seed_project(&self, short_name: &str) -> String {
        let mut state = self.state();
        let id = state.id("proj");
        state.projects.insert(short_name.to_string(), id.clone());
        id
    }

    /// Keys are logins, project short names, issue keys, `comment:{issue}`
    /// and `link:{from}->{to}`.
    pub fn fail_always(&self, key: &str, status: u16) {
        self.state().always_fail.insert(key.to_string(), status);
    }

    pub fn fail_times(&self, key: &str, status: u16, times: usize) {
        self.state()
            .scripted
            .entry(key.to_string())
            .or_default()
            .extend(std::iter::repeat_n(status, times));
    }

    pub fn hide(&self, key: &str) {
        self.state().hidden.insert(key.to_string());
    }

    pub fn attempts(&self, key: &str) -> usize {
        self.state().attempts.get(key).copied().unwrap_or(0)
    }
}

fn link_type(id: &str, name: &str, directed: bool) -> TargetLinkType {
    TargetLinkType {
        id: id.to_string(),
        name: name.to_string(),
        directed,
    }
}

fn conflict(what: &str) -> RemoteError {
    RemoteError::api(409, format!("{what} already exists"))
}

/// Source key carried by a provenance marker line.
fn marker_key(marker: &str) -> &str {
    marker.rsplit(' ').next().unwrap_or(marker)
}

#[async_trait]
impl TargetApi for FakeTarget {
    async fn current_user(&self) -> Result<TargetUser> {
        Ok(TargetUser {
            id: Self::ME.to_string(),
            login: Some("admin".to_string()),
        })
    }

    async fn create_account(&self, account: &NewAccount) -> Result<String> {
        let mut state = self.state();
        state.gate(&account.login)?;
        if state.accounts.contains_key(&account.login) {
            return Err(conflict(&account.login));
        }
        let id = state.id("hub");
        state.accounts.insert(account.login.clone(), id.clone());
        state.creates += 1;
        Ok(id)
    }

    async fn find_account(&self, login: &str) -> Result<Option<String>> {
        let state = self.state();
        if state.hidden.contains(login) {
            return Ok(None);
        }
        Ok(state.accounts.get(login).cloned())
    }

    async fn account_login(&self, hub_id: &str) -> Result<Option<String>> {
        let state = self.state();
        Ok(state
            .accounts
            .iter()
            .find(|(_, id)| id.as_str() == hub_id)
            .map(|(login, _)| login.clone()))
    }

    async fn find_issue_user(&self, login: &str) -> Result<Option<String>> {
        let state = self.state();
        Ok(state.accounts.get(login).map(|hub| format!("user-{hub}")))
    }

    async fn create_project(&self, project: &NewProject) -> Result<String> {
        let mut state = self.state();
        state.gate(&project.short_name)?;
        if state.projects.contains_key(&project.short_name) {
            return Err(conflict(&project.short_name));
        }
        let id = state.id("proj");
        state.projects.insert(project.short_name.clone(), id.clone());
        state
            .project_leaders
            .insert(id.clone(), project.leader_id.clone());
        state.creates += 1;
        Ok(id)
    }

    async fn find_project(&self, short_name: &str) -> Result<Option<String>> {
        let state = self.state();
        if state.hidden.contains(short_name) {
            return Ok(None);
        }
        Ok(state.projects.get(short_name).cloned())
    }

    async fn list_project_statuses(&self, project_id: &str) -> Result<Vec<String>> {
        Ok(self
            .state()
            .project_statuses
            .get(project_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_project_status(&self, project_id: &str, status: &NewStatus) -> Result<()> {
        self.state()
            .project_statuses
            .entry(project_id.to_string())
            .or_default()
            .push(status.name.clone());
        Ok(())
    }

    async fn create_work_item(&self, item: &NewWorkItem) -> Result<String> {
        let mut state = self.state();
        let key = marker_key(&item.marker).to_string();
        state.gate(&key)?;
        let duplicate = state
            .work_items
            .values()
            .any(|w| w.project == item.project_short_name && has_marker(&w.description, &item.marker));
        if duplicate {
            return Err(conflict(&key));
        }
        let id = state.id("item");
        state.work_items.insert(
            id.clone(),
            FakeWorkItem {
                project: item.project_short_name.clone(),
                summary: item.summary.clone(),
                description: item.description.clone(),
            },
        );
        state.creates += 1;
        Ok(id)
    }

    async fn find_work_item(&self, project_short_name: &str, marker: &str) -> Result<Option<String>> {
        let state = self.state();
        if state.hidden.contains(marker_key(marker)) {
            return Ok(None);
        }
        Ok(state
            .work_items
            .iter()
            .find(|(_, w)| w.project == project_short_name && has_marker(&w.description, marker))
            .map(|(id, _)| id.clone()))
    }

    async fn add_comment(&self, work_item_id: &str, text: &str) -> Result<()> {
        let mut state = self.state();
        let issue_key = state
            .work_items
            .get(work_item_id)
            .and_then(|w| {
                w.description
                    .lines()
                    .find(|line| line.starts_with("**Original issue:**"))
                    .map(marker_key)
            })
            .unwrap_or(work_item_id)
            .to_string();
        state.gate(&format!("comment:{issue_key}"))?;
        state
            .comments
            .entry(work_item_id.to_string())
            .or_default()
            .push(text.to_string());
        Ok(())
    }

    async fn list_link_types(&self) -> Result<Vec<TargetLinkType>> {
        Ok(self.state().link_types.clone())
    }

    async fn create_link(&self, link: &NewLink) -> Result<()> {
        let mut state = self.state();
        let key = format!("link:{}->{}", link.from_id, link.to_id);
        state.gate(&key)?;
        let exists = state.links.iter().any(|l| {
            l.type_id == link.link_type_id
                && ((l.from == link.from_id && l.to == link.to_id)
                    || (!link.directed && l.from == link.to_id && l.to == link.from_id))
        });
        if exists {
            return Err(conflict(&key));
        }
        state.links.push(FakeLink {
            from: link.from_id.clone(),
            to: link.to_id.clone(),
            type_id: link.link_type_id.clone(),
        });
        state.creates += 1;
        Ok(())
    }
}

/// A ledger file's JSON with the volatile `timestamp` field removed.
pub fn ledger_json_without_timestamp(path: &std::path::Path) -> serde_json::Value {
    let text = std::fs::read_to_string(path).unwrap();
    let mut value: serde_json::Value = serde_json::from_str(&text).unwrap();
    value.as_object_mut().unwrap().remove("timestamp");
    value
}

/// Await `future`, failing the test if it does not finish in time.
pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, future)
        .await
        .expect("operation timed out - engine may be stuck")
}
