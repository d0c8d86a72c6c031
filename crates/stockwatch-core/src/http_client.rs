use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// HTTP method set used by the stock service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

impl Display for HttpMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request handed to the transport. `path` is opaque and relative to the
/// transport's service root; `query` is a flat string mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: None,
            timeout_ms: 3_000,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// HTTP response returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Why a transport call produced no response at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    Timeout,
    Connect,
    Other,
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    kind: TransportFailure,
    message: String,
}

impl HttpError {
    pub fn new(kind: TransportFailure, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportFailure::Timeout, message)
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportFailure::Connect, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportFailure::Other, message)
    }

    pub const fn kind(&self) -> TransportFailure {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Transport contract consumed by the request executor.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;
}

/// Production transport using reqwest.
///
/// Requests are resolved against `base_url`; when a service name is set it is
/// sent in the `X-WX-SERVICE` header expected by the container gateway.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
    base_url: String,
    service: Option<String>,
}

impl ReqwestHttpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(
            reqwest::Client::builder()
                .user_agent(concat!("stockwatch/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url,
        )
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client: Arc::new(client),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            service: None,
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.url_for(&request.path);
            let mut builder = match request.method {
                HttpMethod::Get => self.client.get(&url),
                HttpMethod::Post => self.client.post(&url),
                HttpMethod::Delete => self.client.delete(&url),
            };

            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }

            if let Some(service) = &self.service {
                builder = builder.header("X-WX-SERVICE", service);
            }

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            builder = builder.timeout(Duration::from_millis(request.timeout_ms));

            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    HttpError::timeout(format!("request timeout: {}", e))
                } else if e.is_connect() {
                    HttpError::connect(format!("connection failed: {}", e))
                } else {
                    HttpError::other(format!("request failed: {}", e))
                }
            })?;

            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| {
                if e.is_timeout() {
                    HttpError::timeout(format!("timeout reading response body: {}", e))
                } else {
                    HttpError::other(format!("failed to read response body: {}", e))
                }
            })?;

            Ok(HttpResponse { status, body })
        })
    }
}

/// Scripted reply for [`MockHttpClient`].
#[derive(Debug, Clone)]
pub enum MockReply {
    Response(HttpResponse),
    Failure(HttpError),
}

#[derive(Debug)]
struct MockRoute {
    method: HttpMethod,
    path: String,
    replies: VecDeque<MockReply>,
}

/// In-memory transport for deterministic offline tests.
///
/// Replies are queued per `(method, path)`; the last queued reply keeps being
/// served once the queue drains. Unrouted requests receive a 404.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    routes: Mutex<Vec<MockRoute>>,
    calls: Mutex<Vec<HttpRequest>>,
    latency: Duration,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `latency` before replying.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn reply(&self, method: HttpMethod, path: impl Into<String>, reply: MockReply) -> &Self {
        let path = path.into();
        let mut routes = self.routes.lock().expect("mock routes lock is not poisoned");
        match routes
            .iter_mut()
            .find(|route| route.method == method && route.path == path)
        {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(MockRoute {
                method,
                path,
                replies: VecDeque::from([reply]),
            }),
        }
        self
    }

    pub fn respond(
        &self,
        method: HttpMethod,
        path: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> &Self {
        self.reply(
            method,
            path,
            MockReply::Response(HttpResponse::new(status, body)),
        )
    }

    pub fn fail(&self, method: HttpMethod, path: impl Into<String>, error: HttpError) -> &Self {
        self.reply(method, path, MockReply::Failure(error))
    }

    /// Every request received so far, in arrival order.
    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls
            .lock()
            .expect("mock calls lock is not poisoned")
            .clone()
    }

    pub fn call_count(&self, method: HttpMethod, path: &str) -> usize {
        self.calls
            .lock()
            .expect("mock calls lock is not poisoned")
            .iter()
            .filter(|call| call.method == method && call.path == path)
            .count()
    }

    fn next_reply(&self, method: HttpMethod, path: &str) -> MockReply {
        let mut routes = self.routes.lock().expect("mock routes lock is not poisoned");
        let Some(route) = routes
            .iter_mut()
            .find(|route| route.method == method && route.path == path)
        else {
            return MockReply::Response(HttpResponse::new(404, "{}"));
        };

        if route.replies.len() > 1 {
            route
                .replies
                .pop_front()
                .unwrap_or(MockReply::Response(HttpResponse::new(404, "{}")))
        } else {
            route
                .replies
                .front()
                .cloned()
                .unwrap_or(MockReply::Response(HttpResponse::new(404, "{}")))
        }
    }
}

impl HttpClient for MockHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let reply = self.next_reply(request.method, &request.path);
            self.calls
                .lock()
                .expect("mock calls lock is not poisoned")
                .push(request);

            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            match reply {
                MockReply::Response(response) => Ok(response),
                MockReply::Failure(error) => Err(error),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_names_are_lowercased() {
        let request =
            HttpRequest::get("/favorites").with_header("Content-Type", "application/json");

        assert_eq!(
            request.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn reqwest_client_joins_base_url_and_path() {
        let client = ReqwestHttpClient::new("https://service.example.test/");

        assert_eq!(
            client.url_for("/favorites"),
            "https://service.example.test/favorites"
        );
        assert_eq!(
            client.url_for("market_cap"),
            "https://service.example.test/market_cap"
        );
    }

    #[tokio::test]
    async fn mock_serves_queue_then_repeats_last_reply() {
        let mock = MockHttpClient::new();
        mock.respond(HttpMethod::Get, "/hot", 500, "")
            .respond(HttpMethod::Get, "/hot", 200, "[]");

        let first = mock.execute(HttpRequest::get("/hot")).await.expect("reply");
        let second = mock.execute(HttpRequest::get("/hot")).await.expect("reply");
        let third = mock.execute(HttpRequest::get("/hot")).await.expect("reply");

        assert_eq!(first.status, 500);
        assert_eq!(second.status, 200);
        assert_eq!(third.status, 200);
        assert_eq!(mock.call_count(HttpMethod::Get, "/hot"), 3);
    }

    #[tokio::test]
    async fn mock_returns_404_for_unrouted_paths() {
        let mock = MockHttpClient::new();

        let response = mock
            .execute(HttpRequest::get("/unknown"))
            .await
            .expect("reply");

        assert_eq!(response.status, 404);
    }
}
