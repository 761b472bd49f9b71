//! The HTTP seam between the collector and the network.
//!
//! The executor only ever sees [`HttpTransport`], so tests drive it with the
//! in-memory mock and production uses reqwest.

use async_trait::async_trait;
use thiserror::Error;

/// HTTP headers represented as key/value pairs.
///
/// Header names are treated case-insensitively by helper functions.
pub type HttpHeaders = Vec<(String, String)>;

/// A minimal GET request against the platform API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HttpHeaders,
}

impl HttpRequest {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }
}

/// A minimal HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Response body as text, for diagnostics.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("http transport error: {0}")]
    Transport(String),

    #[error("no mock response registered for GET {url}")]
    NoMockResponse { url: String },
}

/// Transport boundary for all HTTP I/O.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Get the first header value matching `name` (case-insensitive).
#[must_use]
pub fn header_get<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

pub mod reqwest_transport {
    use super::*;

    use std::time::Duration as StdDuration;

    /// Time allowed to establish a connection, separate from the whole
    /// request timeout.
    const CONNECT_TIMEOUT: StdDuration = StdDuration::from_secs(10);

    /// A real HTTP transport backed by reqwest.
    #[derive(Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        pub fn new(client: reqwest::Client) -> Self {
            Self { client }
        }

        /// Transport whose requests fail after `timeout`.
        pub fn with_timeout(timeout: StdDuration) -> Result<Self, HttpError> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .connect_timeout(CONNECT_TIMEOUT.min(timeout))
                .build()
                .map_err(|e| HttpError::Transport(e.to_string()))?;
            Ok(Self { client })
        }
    }

    /// Transport error text that says which stage failed.
    fn describe(err: &reqwest::Error) -> String {
        if err.is_timeout() {
            format!("timed out: {err}")
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            err.to_string()
        }
    }

    #[async_trait]
    impl HttpTransport for ReqwestTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let builder = request
                .headers
                .iter()
                .fold(self.client.get(&request.url), |b, (name, value)| {
                    b.header(name, value)
                });

            let resp = builder
                .send()
                .await
                .map_err(|e| HttpError::Transport(describe(&e)))?;

            let status = resp.status().as_u16();
            let headers: HttpHeaders = resp
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();

            // A body cut off mid-stream is a transport failure, retried like any other.
            let body = resp
                .bytes()
                .await
                .map_err(|e| HttpError::Transport(describe(&e)))?
                .to_vec();

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }
}

// ---------- Test-only mock transport ----------

#[cfg(test)]
use std::collections::{HashMap, VecDeque};
#[cfg(test)]
use std::sync::{Arc, Mutex};

/// In-memory transport for unit tests.
///
/// Replies are queued per URL and consumed in order; a URL with nothing
/// queued answers [`HttpError::NoMockResponse`].
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[cfg(test)]
enum MockReply {
    Response(HttpResponse),
    Failure(String),
}

#[cfg(test)]
#[derive(Default)]
struct MockTransportInner {
    routes: HashMap<String, VecDeque<MockReply>>,
    requests: Vec<HttpRequest>,
}

#[cfg(test)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a response for a URL.
    ///
    /// If multiple replies are registered for the same URL, they are returned
    /// in FIFO order.
    pub fn push_response(&self, url: impl Into<String>, response: HttpResponse) {
        self.push(url.into(), MockReply::Response(response));
    }

    /// Register a transport-level failure for a URL.
    pub fn push_failure(&self, url: impl Into<String>, message: impl Into<String>) {
        self.push(url.into(), MockReply::Failure(message.into()));
    }

    fn push(&self, url: String, reply: MockReply) {
        let mut inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");
        inner.routes.entry(url).or_default().push_back(reply);
    }

    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        let inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");
        inner.requests.clone()
    }

    /// URLs of every request sent so far, in order.
    #[must_use]
    pub fn requested_urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }
}

#[cfg(test)]
#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");

        let url = request.url.clone();
        inner.requests.push(request);

        match inner.routes.get_mut(&url).and_then(|q| q.pop_front()) {
            Some(MockReply::Response(resp)) => Ok(resp),
            Some(MockReply::Failure(message)) => Err(HttpError::Transport(message)),
            None => Err(HttpError::NoMockResponse { url }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn header_get_is_case_insensitive_and_returns_first_match() {
        let headers: HttpHeaders = vec![
            ("X-RateLimit-Remaining".to_string(), "42".to_string()),
            ("x-ratelimit-remaining".to_string(), "7".to_string()),
        ];
        assert_eq!(header_get(&headers, "x-ratelimit-remaining"), Some("42"));
        assert_eq!(header_get(&headers, "X-RATELIMIT-REMAINING"), Some("42"));
        assert_eq!(header_get(&headers, "missing"), None);
    }

    #[test]
    fn request_builder_collects_headers() {
        let req = HttpRequest::get("https://api.test/users/octocat")
            .with_header("Authorization", "token abc")
            .with_header("Accept", "application/json");

        assert_eq!(req.url, "https://api.test/users/octocat");
        assert_eq!(req.header("authorization"), Some("token abc"));
        assert_eq!(req.headers.len(), 2);
    }

    #[test]
    fn response_success_covers_2xx_only() {
        let mut resp = HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: b"[]".to_vec(),
        };
        assert!(resp.is_success());
        resp.status = 204;
        assert!(resp.is_success());
        resp.status = 304;
        assert!(!resp.is_success());
        resp.status = 403;
        assert!(!resp.is_success());
        assert_eq!(resp.body_text(), "[]");
    }

    #[tokio::test]
    async fn mock_transport_returns_registered_replies_in_order() {
        let transport = MockTransport::new();
        let url = "https://api.test/rate_limit";

        transport.push_failure(url, "connection reset");
        transport.push_response(
            url,
            HttpResponse {
                status: 200,
                headers: vec![("X-Test".to_string(), "ok".to_string())],
                body: b"hello".to_vec(),
            },
        );

        let err = transport
            .send(HttpRequest::get(url))
            .await
            .expect_err("first reply is a failure");
        assert!(matches!(err, HttpError::Transport(ref m) if m == "connection reset"));

        let resp = transport
            .send(HttpRequest::get(url))
            .await
            .expect("second reply is a response");
        assert_eq!(resp.status, 200);
        assert_eq!(resp.header("x-test"), Some("ok"));

        assert_eq!(transport.requested_urls(), vec![url, url]);
    }

    #[tokio::test]
    async fn mock_transport_errors_when_no_response_is_registered() {
        let transport = MockTransport::new();

        let err = transport
            .send(HttpRequest::get("https://api.test/missing"))
            .await
            .expect_err("missing mock should error");
        match err {
            HttpError::NoMockResponse { url } => assert_eq!(url, "https://api.test/missing"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn reqwest_transport_with_short_timeout_builds_client() {
        reqwest_transport::ReqwestTransport::with_timeout(Duration::from_millis(1))
            .expect("reqwest transport should build");
    }

    #[tokio::test]
    async fn reqwest_transport_returns_transport_error_for_invalid_url() {
        let transport = reqwest_transport::ReqwestTransport::new(reqwest::Client::new());

        let err = transport
            .send(HttpRequest::get("not a url"))
            .await
            .expect_err("expected error");
        assert!(matches!(err, HttpError::Transport(_)));
    }
}
