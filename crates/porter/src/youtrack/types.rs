//! Wire types for the YouTrack and Hub REST APIs.
//!
//! Only the fields the migration reads or writes are modelled; unknown
//! response fields are ignored.

use serde::{Deserialize, Serialize};

/// Any entity reference that carries an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityId {
    pub id: String,
}

/// A Hub or YouTrack user.
#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
    pub id: String,
    #[serde(default)]
    pub login: Option<String>,
}

/// Hub user search responses come wrapped or bare depending on the version.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum HubUsers {
    Wrapped { users: Vec<UserEntry> },
    Bare(Vec<UserEntry>),
}

impl HubUsers {
    pub fn into_vec(self) -> Vec<UserEntry> {
        match self {
            HubUsers::Wrapped { users } => users,
            HubUsers::Bare(users) => users,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountBody<'a> {
    pub login: &'a str,
    pub name: &'a str,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectBody<'a> {
    pub name: &'a str,
    pub short_name: &'a str,
    pub description: &'a str,
    pub leader: EntityId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectEntry {
    pub id: String,
    #[serde(default)]
    pub short_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateIssueBody<'a> {
    pub project: EntityId,
    pub summary: &'a str,
    pub description: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueEntry {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateStatusBody<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusEntry {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommentBody<'a> {
    pub text: &'a str,
}

/// Body for attaching an issue to one end of a link.
#[derive(Debug, Serialize)]
pub struct LinkTargetBody<'a> {
    pub id: &'a str,
}
