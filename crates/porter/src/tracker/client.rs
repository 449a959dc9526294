//! Tracker API client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::error::TrackerError;
use crate::http::reqwest_transport::ReqwestTransport;
use crate::http::{HttpHeaders, HttpRequest, HttpTransport};
use crate::platform::{
    self, PacedTransport, SourceApi, SourceComment, SourceIssue, SourceLink, SourceQueue,
    SourceStatus, SourceUser,
};

/// Default Tracker API root.
pub const DEFAULT_BASE_URL: &str = "https://api.tracker.yandex.net/v2";

/// Upper bound for a single request, connect included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How the organization is hosted, which decides the organization header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrgHosting {
    /// `X-Org-ID`.
    #[default]
    Standard,
    /// `X-Cloud-Org-Id`.
    Cloud,
}

impl OrgHosting {
    pub fn header_name(self) -> &'static str {
        match self {
            OrgHosting::Standard => "X-Org-ID",
            OrgHosting::Cloud => "X-Cloud-Org-Id",
        }
    }
}

/// Connection settings for [`TrackerClient`].
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub base_url: String,
    pub token: String,
    pub org_id: String,
    pub hosting: OrgHosting,
}

/// Tracker API client (the migration source).
///
/// Every request carries `Authorization: OAuth <token>` and the organization
/// header chosen once from [`OrgHosting`].
#[derive(Clone)]
pub struct TrackerClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    headers: HttpHeaders,
}

impl TrackerClient {
    /// Create a client that pauses `request_delay` after every call.
    pub fn new(settings: &TrackerSettings, request_delay: Duration) -> Result<Self, TrackerError> {
        let transport = ReqwestTransport::with_timeout(REQUEST_TIMEOUT)
            .map_err(|e| TrackerError::Config(e.to_string()))?;
        let paced = PacedTransport::new(Arc::new(transport), request_delay);
        Ok(Self::new_with_transport(settings, Arc::new(paced)))
    }

    pub fn new_with_transport(settings: &TrackerSettings, transport: Arc<dyn HttpTransport>) -> Self {
        let headers = vec![
            ("Accept".to_string(), "application/json".to_string()),
            (
                "Authorization".to_string(),
                format!("OAuth {}", settings.token),
            ),
            (
                settings.hosting.header_name().to_string(),
                settings.org_id.clone(),
            ),
        ];
        Self {
            transport,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            headers,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> String {
        let mut url = format!("{}{}", self.base_url, path);
        if !query.is_empty() {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())))
                .finish();
            url.push('?');
            url.push_str(&encoded);
        }
        url
    }

    fn page_query(page: u32, per_page: u32) -> Vec<(&'static str, String)> {
        vec![("perPage", per_page.to_string()), ("page", page.to_string())]
    }

    /// Make an authenticated GET request.
    async fn get<T: DeserializeOwned>(&self, url: String) -> Result<T, TrackerError> {
        tracing::debug!("GET {}", url);
        let response = self
            .transport
            .send(HttpRequest::get(url, self.headers.clone()))
            .await
            .map_err(|e| TrackerError::Http(e.to_string()))?;

        if !response.is_success() {
            return Err(TrackerError::Api {
                status: response.status,
                message: response.text(),
            });
        }

        Ok(serde_json::from_slice(&response.body)?)
    }
}

fn path_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[async_trait]
impl SourceApi for TrackerClient {
    async fn list_users(&self, page: u32, per_page: u32) -> platform::Result<Vec<SourceUser>> {
        let url = self.url("/users", &Self::page_query(page, per_page));
        Ok(self.get(url).await?)
    }

    async fn list_queues(&self, page: u32, per_page: u32) -> platform::Result<Vec<SourceQueue>> {
        let url = self.url("/queues", &Self::page_query(page, per_page));
        Ok(self.get(url).await?)
    }

    async fn list_issues(
        &self,
        queue: &str,
        page: u32,
        per_page: u32,
    ) -> platform::Result<Vec<SourceIssue>> {
        let mut query = vec![("queue", queue.to_string())];
        query.extend(Self::page_query(page, per_page));
        let url = self.url("/issues", &query);
        Ok(self.get(url).await?)
    }

    async fn list_comments(&self, issue_key: &str) -> platform::Result<Vec<SourceComment>> {
        let url = self.url(&format!("/issues/{}/comments", path_segment(issue_key)), &[]);
        Ok(self.get(url).await?)
    }

    async fn list_links(&self, issue_key: &str) -> platform::Result<Vec<SourceLink>> {
        let url = self.url(&format!("/issues/{}/links", path_segment(issue_key)), &[]);
        Ok(self.get(url).await?)
    }

    async fn list_queue_statuses(&self, queue: &str) -> platform::Result<Vec<SourceStatus>> {
        let url = self.url(&format!("/queues/{}/statuses", path_segment(queue)), &[]);
        Ok(self.get(url).await?)
    }
}
