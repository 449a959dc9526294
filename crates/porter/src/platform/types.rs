use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::Result;

/// An identifier that the source may send either as a JSON string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawId::Number(n) => write!(f, "{n}"),
            RawId::Text(s) => f.write_str(s),
        }
    }
}

/// A compact reference to a source user as embedded in other records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserRef {
    #[serde(default)]
    pub id: Option<RawId>,
    #[serde(default)]
    pub display: Option<String>,
}

impl UserRef {
    /// Human-readable name, falling back to the id.
    pub fn label(&self) -> Option<String> {
        self.display
            .clone()
            .or_else(|| self.id.as_ref().map(ToString::to_string))
    }
}

/// A source account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceUser {
    /// Numeric account uid as exposed by the user directory.
    #[serde(default)]
    pub uid: Option<RawId>,
    #[serde(default)]
    pub id: Option<RawId>,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl SourceUser {
    /// Stable source id: the uid, then the id, then the login.
    pub fn source_id(&self) -> Option<String> {
        self.uid
            .as_ref()
            .or(self.id.as_ref())
            .map(ToString::to_string)
            .or_else(|| self.login.clone())
    }
}

/// A source project (queue).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceQueue {
    /// Empty when the source omitted it; such a queue is reported, not migrated.
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub lead: Option<UserRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyRef {
    #[serde(default)]
    pub key: String,
}

/// A source work item (issue).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceIssue {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub queue: Option<KeyRef>,
    #[serde(default)]
    pub created_by: Option<UserRef>,
    #[serde(default)]
    pub assignee: Option<UserRef>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl SourceIssue {
    /// Key of the owning queue, taken from the record or from the key prefix.
    pub fn queue_key(&self) -> &str {
        match &self.queue {
            Some(queue) if !queue.key.is_empty() => &queue.key,
            _ => self
                .key
                .rsplit_once('-')
                .map_or(self.key.as_str(), |(prefix, _)| prefix),
        }
    }
}

/// A comment on a source work item.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceComment {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub created_by: Option<UserRef>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// The type part of a source link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SourceLinkType {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
}

/// A relationship from one source work item to another.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceLink {
    #[serde(rename = "type", default)]
    pub link_type: Option<SourceLinkType>,
    /// `outward` or `inward` relative to the issue the link was listed on.
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub object: Option<KeyRef>,
}

impl SourceLink {
    /// The source type key, lower-cased.
    pub fn type_key(&self) -> Option<String> {
        let ty = self.link_type.as_ref()?;
        ty.id
            .as_deref()
            .or(ty.key.as_deref())
            .map(|k| k.trim().to_lowercase())
    }

    /// Key of the work item on the other end of the link.
    pub fn other_key(&self) -> Option<&str> {
        self.object
            .as_ref()
            .map(|o| o.key.as_str())
            .filter(|k| !k.is_empty())
    }

    pub fn is_inward(&self) -> bool {
        self.direction
            .as_deref()
            .is_some_and(|d| d.eq_ignore_ascii_case("inward"))
    }
}

/// A workflow status defined on a source queue.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceStatus {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl SourceStatus {
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.display.as_deref())
            .or(self.key.as_deref())
    }
}

/// The account the target credentials belong to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TargetUser {
    pub id: String,
    #[serde(default)]
    pub login: Option<String>,
}

/// Payload for creating a target account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub login: String,
    pub name: String,
    pub email: Option<String>,
}

/// Payload for creating a target project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    pub short_name: String,
    pub name: String,
    pub description: String,
    /// Issue-API id of the project owner.
    pub leader_id: String,
}

/// Payload for creating a target work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWorkItem {
    pub project_id: String,
    pub project_short_name: String,
    pub summary: String,
    pub description: String,
    /// Provenance line embedded in `description`; used to find the item again.
    pub marker: String,
}

/// Payload for creating a status on a target project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStatus {
    pub name: String,
    pub description: Option<String>,
}

/// A link type defined on the target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TargetLinkType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub directed: bool,
}

/// Payload for linking two target work items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    /// Work item on the outward side.
    pub from_id: String,
    pub to_id: String,
    pub link_type_id: String,
    pub directed: bool,
}

/// Read access to the system being migrated from.
///
/// List operations are page-addressed (1-based); an empty or short page
/// means the listing is exhausted.
#[async_trait]
pub trait SourceApi: Send + Sync {
    async fn list_users(&self, page: u32, per_page: u32) -> Result<Vec<SourceUser>>;

    async fn list_queues(&self, page: u32, per_page: u32) -> Result<Vec<SourceQueue>>;

    async fn list_issues(&self, queue: &str, page: u32, per_page: u32)
    -> Result<Vec<SourceIssue>>;

    async fn list_comments(&self, issue_key: &str) -> Result<Vec<SourceComment>>;

    async fn list_links(&self, issue_key: &str) -> Result<Vec<SourceLink>>;

    async fn list_queue_statuses(&self, queue: &str) -> Result<Vec<SourceStatus>>;
}

/// Write access to the system being migrated to.
///
/// Create operations surface a 409 as `RemoteError::Api { status: 409, .. }`;
/// callers decide whether that means "already exists".
#[async_trait]
pub trait TargetApi: Send + Sync {
    /// The account the configured token belongs to.
    async fn current_user(&self) -> Result<TargetUser>;

    /// Create an account, returning its hub id.
    async fn create_account(&self, account: &NewAccount) -> Result<String>;

    /// Find an account by exact login, returning its hub id.
    async fn find_account(&self, login: &str) -> Result<Option<String>>;

    /// Login of the account with the given hub id.
    async fn account_login(&self, hub_id: &str) -> Result<Option<String>>;

    /// Issue-API id of the user with the given login.
    async fn find_issue_user(&self, login: &str) -> Result<Option<String>>;

    async fn create_project(&self, project: &NewProject) -> Result<String>;

    async fn find_project(&self, short_name: &str) -> Result<Option<String>>;

    /// Names of the statuses already defined on a project.
    async fn list_project_statuses(&self, project_id: &str) -> Result<Vec<String>>;

    async fn create_project_status(&self, project_id: &str, status: &NewStatus) -> Result<()>;

    async fn create_work_item(&self, item: &NewWorkItem) -> Result<String>;

    /// Find a work item in a project whose description carries `marker` on its own line.
    async fn find_work_item(&self, project_short_name: &str, marker: &str)
    -> Result<Option<String>>;

    async fn add_comment(&self, work_item_id: &str, text: &str) -> Result<()>;

    async fn list_link_types(&self) -> Result<Vec<TargetLinkType>>;

    async fn create_link(&self, link: &NewLink) -> Result<()>;
}
