//! Transport abstraction under the API client.
//!
//! `HttpTransport` talks to a real server; `MockTransport` replays canned
//! responses for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::error::ApiError;

/// A single request against the remote API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiRequest {
    pub path: String,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// When set, the request is conditional: the server answers 304 if the
    /// resource has not moved past this version.
    pub if_modified_since_version: Option<i64>,
}

/// Raw response carrying the headers the sync core interprets.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub last_modified_version: Option<i64>,
    pub total_results: Option<usize>,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: &ApiRequest) -> Result<RawResponse, ApiError>;
}

/// reqwest-backed transport against a base URL.
pub struct HttpTransport {
    base_url: String,
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, request: &ApiRequest) -> Result<RawResponse, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.http.get(&url).query(&request.params);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(version) = request.if_modified_since_version {
            builder = builder.header("If-Modified-Since-Version", version.to_string());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("Content-Type")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string());
        let last_modified_version = header_value(&response, "Last-Modified-Version");
        let total_results = header_value(&response, "Total-Results");
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?
            .to_vec();

        Ok(RawResponse {
            status,
            content_type,
            last_modified_version,
            total_results,
            body,
        })
    }
}

fn header_value<T: std::str::FromStr>(response: &reqwest::Response, name: &str) -> Option<T> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

/// Canned-response transport for tests.
///
/// Responses are consumed in FIFO order; every issued request is recorded so
/// tests can assert on batching and pagination.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<RawResponse, ApiError>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: RawResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_error(&self, error: ApiError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Requests issued so far, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, request: &ApiRequest) -> Result<RawResponse, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Request("no mock response queued".to_string())))
    }
}
