use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::http::{HttpError, HttpRequest, HttpResponse, HttpTransport};

/// Default pause after every request, in milliseconds.
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 500;

/// A transport decorator that sleeps for a fixed delay after every request.
///
/// This is deliberately not a token bucket: neither remote system documents
/// its limits, so each client keeps exactly one request in flight and pauses
/// for `delay` once the response (or failure) is in.
///
/// # Example
///
/// ```ignore
/// use porter::platform::PacedTransport;
///
/// let transport = PacedTransport::new(Arc::new(reqwest_transport), Duration::from_millis(500));
/// let client = TrackerClient::new_with_transport(&settings, Arc::new(transport));
/// ```
#[derive(Clone)]
pub struct PacedTransport {
    inner: Arc<dyn HttpTransport>,
    delay: Duration,
}

impl PacedTransport {
    pub fn new(inner: Arc<dyn HttpTransport>, delay: Duration) -> Self {
        Self { inner, delay }
    }

    /// The configured inter-call delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[async_trait]
impl HttpTransport for PacedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let result = self.inner.send(request).await;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, MockTransport};

    #[tokio::test(start_paused = true)]
    async fn paced_transport_sleeps_after_each_request() {
        let mock = MockTransport::new();
        let url = "https://example.com/users";
        mock.push_json(HttpMethod::Get, url, 200, serde_json::json!([]));
        mock.push_json(HttpMethod::Get, url, 200, serde_json::json!([]));

        let paced = PacedTransport::new(Arc::new(mock.clone()), Duration::from_millis(300));
        let start = tokio::time::Instant::now();

        paced.send(HttpRequest::get(url, Vec::new())).await.unwrap();
        paced.send(HttpRequest::get(url, Vec::new())).await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(600));
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn paced_transport_also_pauses_after_failures() {
        let mock = MockTransport::new();
        let paced = PacedTransport::new(Arc::new(mock), Duration::from_secs(1));
        let start = tokio::time::Instant::now();

        let err = paced
            .send(HttpRequest::get("https://example.com/missing", Vec::new()))
            .await;

        assert!(err.is_err());
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn zero_delay_does_not_sleep() {
        let mock = MockTransport::new();
        let url = "https://example.com/x";
        mock.push_json(HttpMethod::Get, url, 200, serde_json::json!({}));
        let paced = PacedTransport::new(Arc::new(mock), Duration::ZERO);
        assert_eq!(paced.delay(), Duration::ZERO);
        paced.send(HttpRequest::get(url, Vec::new())).await.unwrap();
    }
}
