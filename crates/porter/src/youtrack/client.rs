//! YouTrack API client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::error::YouTrackError;
use super::types::{
    CommentBody, CreateAccountBody, CreateIssueBody, CreateProjectBody, CreateStatusBody,
    EntityId, HubUsers, IssueEntry, LinkTargetBody, ProjectEntry, StatusEntry, UserEntry,
};
use crate::http::reqwest_transport::ReqwestTransport;
use crate::http::{HttpHeaders, HttpRequest, HttpResponse, HttpTransport};
use crate::platform::{
    self, NewAccount, NewLink, NewProject, NewStatus, NewWorkItem, PacedTransport, TargetApi,
    TargetLinkType, TargetUser,
};
use crate::sync::work_items::has_marker;

/// Upper bound for a single request, connect included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for lookups by name; matches are filtered client-side.
const LOOKUP_LIMIT: &str = "100";

/// Candidates fetched when searching for a work item by its provenance line.
const WORK_ITEM_SEARCH_LIMIT: &str = "10";

/// YouTrack API client (the migration target).
#[derive(Clone)]
pub struct YouTrackClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    headers: HttpHeaders,
}

impl YouTrackClient {
    /// Create a client that pauses `request_delay` after every call.
    pub fn new(
        base_url: &str,
        token: &str,
        request_delay: Duration,
    ) -> Result<Self, YouTrackError> {
        let transport = ReqwestTransport::with_timeout(REQUEST_TIMEOUT)
            .map_err(|e| YouTrackError::Config(e.to_string()))?;
        let paced = PacedTransport::new(Arc::new(transport), request_delay);
        Ok(Self::new_with_transport(base_url, token, Arc::new(paced)))
    }

    pub fn new_with_transport(base_url: &str, token: &str, transport: Arc<dyn HttpTransport>) -> Self {
        let headers = vec![
            ("Accept".to_string(), "application/json".to_string()),
            ("Authorization".to_string(), format!("Bearer {token}")),
        ];
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> String {
        let mut url = format!("{}{}", self.base_url, path);
        if !query.is_empty() {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(query)
                .finish();
            url.push('?');
            url.push_str(&encoded);
        }
        url
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, YouTrackError> {
        tracing::debug!("{} {}", request.method.as_str(), request.url);
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| YouTrackError::Http(e.to_string()))?;

        if !response.is_success() {
            return Err(YouTrackError::Api {
                status: response.status,
                message: response.text(),
            });
        }
        Ok(response)
    }

    async fn get<T: DeserializeOwned>(&self, url: String) -> Result<T, YouTrackError> {
        let response = self
            .send(HttpRequest::get(url, self.headers.clone()))
            .await?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        url: String,
        body: &B,
    ) -> Result<T, YouTrackError> {
        let response = self.post_raw(url, body).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    async fn post_raw<B: Serialize>(
        &self,
        url: String,
        body: &B,
    ) -> Result<HttpResponse, YouTrackError> {
        let payload = serde_json::to_vec(body)?;
        self.send(HttpRequest::post_json(url, self.headers.clone(), payload))
            .await
    }
}

fn path_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn find_by_login(users: Vec<UserEntry>, login: &str) -> Option<String> {
    users
        .into_iter()
        .find(|u| u.login.as_deref() == Some(login))
        .map(|u| u.id)
}

/// Search phrase for a provenance marker: the marker without markup.
fn marker_phrase(marker: &str) -> String {
    marker.replace('*', "").trim().to_string()
}

#[async_trait]
impl TargetApi for YouTrackClient {
    async fn current_user(&self) -> platform::Result<TargetUser> {
        let url = self.url("/api/users/me", &[("fields", "id,login")]);
        Ok(self.get(url).await?)
    }

    async fn create_account(&self, account: &NewAccount) -> platform::Result<String> {
        let url = self.url("/hub/api/rest/users", &[("fields", "id,login,name")]);
        let body = CreateAccountBody {
            login: &account.login,
            name: &account.name,
            is_active: true,
            email: account.email.as_deref(),
        };
        let created: EntityId = self.post(url, &body).await?;
        Ok(created.id)
    }

    async fn find_account(&self, login: &str) -> platform::Result<Option<String>> {
        let query = format!("login:{login}");
        let url = self.url(
            "/hub/api/rest/users",
            &[
                ("query", query.as_str()),
                ("fields", "id,login"),
                ("$top", LOOKUP_LIMIT),
            ],
        );
        let users: HubUsers = self.get(url).await?;
        Ok(find_by_login(users.into_vec(), login))
    }

    async fn account_login(&self, hub_id: &str) -> platform::Result<Option<String>> {
        let url = self.url(
            &format!("/hub/api/rest/users/{}", path_segment(hub_id)),
            &[("fields", "id,login")],
        );
        match self.get::<UserEntry>(url).await {
            Ok(user) => Ok(user.login),
            Err(e) if e.status() == Some(404) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_issue_user(&self, login: &str) -> platform::Result<Option<String>> {
        let url = self.url(
            "/api/users",
            &[
                ("query", login),
                ("fields", "id,login"),
                ("$top", LOOKUP_LIMIT),
            ],
        );
        let users: Vec<UserEntry> = self.get(url).await?;
        Ok(find_by_login(users, login))
    }

    async fn create_project(&self, project: &NewProject) -> platform::Result<String> {
        let url = self.url("/api/admin/projects", &[("fields", "id,shortName,name")]);
        let body = CreateProjectBody {
            name: &project.name,
            short_name: &project.short_name,
            description: &project.description,
            leader: EntityId {
                id: project.leader_id.clone(),
            },
        };
        let created: EntityId = self.post(url, &body).await?;
        Ok(created.id)
    }

    async fn find_project(&self, short_name: &str) -> platform::Result<Option<String>> {
        let url = self.url(
            "/api/admin/projects",
            &[
                ("query", short_name),
                ("fields", "id,shortName"),
                ("$top", LOOKUP_LIMIT),
            ],
        );
        let projects: Vec<ProjectEntry> = self.get(url).await?;
        Ok(projects
            .into_iter()
            .find(|p| p.short_name.as_deref() == Some(short_name))
            .map(|p| p.id))
    }

    async fn list_project_statuses(&self, project_id: &str) -> platform::Result<Vec<String>> {
        let url = self.url(
            &format!("/api/admin/projects/{}/statuses", path_segment(project_id)),
            &[("fields", "id,name")],
        );
        let statuses: Vec<StatusEntry> = self.get(url).await?;
        Ok(statuses.into_iter().filter_map(|s| s.name).collect())
    }

    async fn create_project_status(
        &self,
        project_id: &str,
        status: &NewStatus,
    ) -> platform::Result<()> {
        let url = self.url(
            &format!("/api/admin/projects/{}/statuses", path_segment(project_id)),
            &[("fields", "id,name")],
        );
        let body = CreateStatusBody {
            name: &status.name,
            description: status.description.as_deref(),
        };
        self.post_raw(url, &body).await?;
        Ok(())
    }

    async fn create_work_item(&self, item: &NewWorkItem) -> platform::Result<String> {
        let url = self.url("/api/issues", &[("fields", "id,idReadable")]);
        let body = CreateIssueBody {
            project: EntityId {
                id: item.project_id.clone(),
            },
            summary: &item.summary,
            description: &item.description,
        };
        let created: EntityId = self.post(url, &body).await?;
        Ok(created.id)
    }

    async fn find_work_item(
        &self,
        project_short_name: &str,
        marker: &str,
    ) -> platform::Result<Option<String>> {
        let query = format!(
            "project: {{{}}} \"{}\"",
            project_short_name,
            marker_phrase(marker)
        );
        let url = self.url(
            "/api/issues",
            &[
                ("query", query.as_str()),
                ("fields", "id,description"),
                ("$top", WORK_ITEM_SEARCH_LIMIT),
            ],
        );
        let issues: Vec<IssueEntry> = self.get(url).await?;
        Ok(issues
            .into_iter()
            .find(|i| i.description.as_deref().is_some_and(|d| has_marker(d, marker)))
            .map(|i| i.id))
    }

    async fn add_comment(&self, work_item_id: &str, text: &str) -> platform::Result<()> {
        let url = self.url(
            &format!("/api/issues/{}/comments", path_segment(work_item_id)),
            &[("fields", "id")],
        );
        self.post_raw(url, &CommentBody { text }).await?;
        Ok(())
    }

    async fn list_link_types(&self) -> platform::Result<Vec<TargetLinkType>> {
        let url = self.url("/api/admin/issueLinkTypes", &[("fields", "id,name,directed")]);
        Ok(self.get(url).await?)
    }

    async fn create_link(&self, link: &NewLink) -> platform::Result<()> {
        // Directed types are addressed by their outward ("s"ource) end.
        let end = if link.directed {
            format!("{}s", link.link_type_id)
        } else {
            link.link_type_id.clone()
        };
        let url = self.url(
            &format!(
                "/api/issues/{}/links/{}/issues",
                path_segment(&link.from_id),
                path_segment(&end)
            ),
            &[("fields", "id")],
        );
        self.post_raw(url, &LinkTargetBody { id: &link.to_id })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, MockTransport, header_get};
    use crate::platform::{ErrorClass, RemoteError};

    const BASE: &str = "https://yt.test";

    fn client(mock: &MockTransport) -> YouTrackClient {
        YouTrackClient::new_with_transport(&format!("{BASE}/"), "perm:abc", Arc::new(mock.clone()))
    }

    fn body_json(mock: &MockTransport, index: usize) -> serde_json::Value {
        serde_json::from_slice(&mock.requests()[index].body).unwrap()
    }

    #[tokio::test]
    async fn test_current_user_uses_bearer_token() {
        let mock = MockTransport::new();
        mock.push_json(
            HttpMethod::Get,
            format!("{BASE}/api/users/me?fields=id%2Clogin"),
            200,
            serde_json::json!({"id": "1-1", "login": "admin", "$type": "Me"}),
        );

        let me = client(&mock).current_user().await.unwrap();

        assert_eq!(me.id, "1-1");
        assert_eq!(
            header_get(&mock.requests()[0].headers, "authorization"),
            Some("Bearer perm:abc")
        );
    }

    #[tokio::test]
    async fn test_create_account_posts_to_hub() {
        let mock = MockTransport::new();
        mock.push_json(
            HttpMethod::Post,
            format!("{BASE}/hub/api/rest/users?fields=id%2Clogin%2Cname"),
            200,
            serde_json::json!({"id": "hub-7", "login": "alice"}),
        );

        let id = client(&mock)
            .create_account(&NewAccount {
                login: "alice".into(),
                name: "Alice".into(),
                email: Some("alice@example.com".into()),
            })
            .await
            .unwrap();

        assert_eq!(id, "hub-7");
        assert_eq!(
            body_json(&mock, 0),
            serde_json::json!({
                "login": "alice",
                "name": "Alice",
                "isActive": true,
                "email": "alice@example.com"
            })
        );
    }

    #[tokio::test]
    async fn test_create_conflict_is_passed_through() {
        let mock = MockTransport::new();
        mock.push_json(
            HttpMethod::Post,
            format!("{BASE}/api/admin/projects?fields=id%2CshortName%2Cname"),
            409,
            serde_json::json!({"error": "duplicate shortName"}),
        );

        let err = client(&mock)
            .create_project(&NewProject {
                short_name: "OPS".into(),
                name: "Operations".into(),
                description: String::new(),
                leader_id: "1-1".into(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::Conflict);
        assert_eq!(err.status(), Some(409));
    }

    #[tokio::test]
    async fn test_find_account_matches_exact_login_in_either_shape() {
        let mock = MockTransport::new();
        let url = format!("{BASE}/hub/api/rest/users?query=login%3Aal&fields=id%2Clogin&%24top=100");
        mock.push_json(
            HttpMethod::Get,
            &url,
            200,
            serde_json::json!({"users": [{"id": "h1", "login": "alice"}, {"id": "h2", "login": "al"}]}),
        );
        mock.push_json(
            HttpMethod::Get,
            &url,
            200,
            serde_json::json!([{"id": "h1", "login": "alice"}]),
        );

        let client = client(&mock);
        assert_eq!(client.find_account("al").await.unwrap(), Some("h2".to_string()));
        assert_eq!(client.find_account("al").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_account_login_not_found_is_none() {
        let mock = MockTransport::new();
        mock.push_json(
            HttpMethod::Get,
            format!("{BASE}/hub/api/rest/users/hub-1?fields=id%2Clogin"),
            200,
            serde_json::json!({"id": "hub-1", "login": "alice"}),
        );
        mock.push_json(
            HttpMethod::Get,
            format!("{BASE}/hub/api/rest/users/hub-2?fields=id%2Clogin"),
            404,
            serde_json::json!({"error": "not found"}),
        );

        let client = client(&mock);
        assert_eq!(
            client.account_login("hub-1").await.unwrap(),
            Some("alice".to_string())
        );
        assert_eq!(client.account_login("hub-2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_find_issue_user_and_project_filter_exact() {
        let mock = MockTransport::new();
        mock.push_json(
            HttpMethod::Get,
            format!("{BASE}/api/users?query=alice&fields=id%2Clogin&%24top=100"),
            200,
            serde_json::json!([{"id": "1-5", "login": "alice2"}, {"id": "1-4", "login": "alice"}]),
        );
        mock.push_json(
            HttpMethod::Get,
            format!("{BASE}/api/admin/projects?query=OPS&fields=id%2CshortName&%24top=100"),
            200,
            serde_json::json!([{"id": "0-9", "shortName": "OPSX"}]),
        );

        let client = client(&mock);
        assert_eq!(
            client.find_issue_user("alice").await.unwrap(),
            Some("1-4".to_string())
        );
        assert_eq!(client.find_project("OPS").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_statuses_round_trip_through_project_endpoint() {
        let mock = MockTransport::new();
        let url = format!("{BASE}/api/admin/projects/0-1/statuses?fields=id%2Cname");
        mock.push_json(
            HttpMethod::Get,
            &url,
            200,
            serde_json::json!([{"id": "s1", "name": "Open"}, {"id": "s2"}]),
        );
        mock.push_json(HttpMethod::Post, &url, 200, serde_json::json!({"id": "s3"}));

        let client = client(&mock);
        assert_eq!(
            client.list_project_statuses("0-1").await.unwrap(),
            vec!["Open".to_string()]
        );
        client
            .create_project_status(
                "0-1",
                &NewStatus {
                    name: "In Review".into(),
                    description: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(body_json(&mock, 1), serde_json::json!({"name": "In Review"}));
    }

    #[tokio::test]
    async fn test_find_work_item_checks_marker_line() {
        let mock = MockTransport::new();
        mock.push_json(
            HttpMethod::Get,
            format!(
                "{BASE}/api/issues?query=project%3A+%7BOPS%7D+%22Original+issue%3A+OPS-1%22&fields=id%2Cdescription&%24top=10"
            ),
            200,
            serde_json::json!([
                {"id": "2-10", "description": "mentions **Original issue:** OPS-12 in passing"},
                {"id": "2-11", "description": "body\n\n---\n**Original issue:** OPS-1\n**Author:** A"}
            ]),
        );

        let found = client(&mock)
            .find_work_item("OPS", "**Original issue:** OPS-1")
            .await
            .unwrap();

        assert_eq!(found, Some("2-11".to_string()));
    }

    #[tokio::test]
    async fn test_create_work_item_and_comment() {
        let mock = MockTransport::new();
        mock.push_json(
            HttpMethod::Post,
            format!("{BASE}/api/issues?fields=id%2CidReadable"),
            200,
            serde_json::json!({"id": "2-1", "idReadable": "OPS-1"}),
        );
        mock.push_json(
            HttpMethod::Post,
            format!("{BASE}/api/issues/2-1/comments?fields=id"),
            200,
            serde_json::json!({"id": "4-1"}),
        );

        let client = client(&mock);
        let id = client
            .create_work_item(&NewWorkItem {
                project_id: "0-1".into(),
                project_short_name: "OPS".into(),
                summary: "Rotate keys".into(),
                description: "text".into(),
                marker: "**Original issue:** OPS-1".into(),
            })
            .await
            .unwrap();
        client.add_comment(&id, "hello").await.unwrap();

        assert_eq!(
            body_json(&mock, 0),
            serde_json::json!({"project": {"id": "0-1"}, "summary": "Rotate keys", "description": "text"})
        );
        assert_eq!(body_json(&mock, 1), serde_json::json!({"text": "hello"}));
    }

    #[tokio::test]
    async fn test_create_link_addresses_directed_end() {
        let mock = MockTransport::new();
        mock.push_json(
            HttpMethod::Post,
            format!("{BASE}/api/issues/2-1/links/7-2s/issues?fields=id"),
            200,
            serde_json::json!({"id": "2-2"}),
        );
        mock.push_json(
            HttpMethod::Post,
            format!("{BASE}/api/issues/2-1/links/7-0/issues?fields=id"),
            409,
            serde_json::json!({"error": "already linked"}),
        );

        let client = client(&mock);
        client
            .create_link(&NewLink {
                from_id: "2-1".into(),
                to_id: "2-2".into(),
                link_type_id: "7-2".into(),
                directed: true,
            })
            .await
            .unwrap();
        let err = client
            .create_link(&NewLink {
                from_id: "2-1".into(),
                to_id: "2-3".into(),
                link_type_id: "7-0".into(),
                directed: false,
            })
            .await
            .unwrap_err();

        assert_eq!(body_json(&mock, 0), serde_json::json!({"id": "2-2"}));
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_link_types_and_transport_failure() {
        let mock = MockTransport::new();
        let url = format!("{BASE}/api/admin/issueLinkTypes?fields=id%2Cname%2Cdirected");
        mock.push_failure(HttpMethod::Get, &url, "timed out");
        mock.push_json(
            HttpMethod::Get,
            &url,
            200,
            serde_json::json!([{"id": "7-0", "name": "Relates"}, {"id": "7-2", "name": "Depend", "directed": true}]),
        );

        let client = client(&mock);
        let err = client.list_link_types().await.unwrap_err();
        assert!(matches!(err, RemoteError::Network { .. }));

        let types = client.list_link_types().await.unwrap();
        assert!(!types[0].directed);
        assert!(types[1].directed);
    }

    #[test]
    fn test_marker_phrase_strips_markup() {
        assert_eq!(marker_phrase("**Original issue:** OPS-1"), "Original issue: OPS-1");
    }
}
