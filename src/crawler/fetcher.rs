//! Fetch collaborator interface and the default HTTP implementation
//!
//! This module handles:
//! - The `Fetcher` trait the dispatcher calls for every in-flight item
//! - Classifying transfers into success, retryable and fatal outcomes
//! - A `reqwest`-backed fetcher with status-driven retries

use crate::config::HttpConfig;
use crate::item::{Method, WorkItem};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Result of one fetch attempt
#[derive(Debug)]
pub enum FetchOutcome {
    /// Transfer finished and its result is acceptable
    Success(Response),

    /// Transfer failed but may succeed later
    Retryable(RetryKind),

    /// Transfer failed permanently
    Fatal(String),
}

/// Flavor of a retryable failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryKind {
    /// The transfer timed out; bounded by the item's timeout retry budget
    Timeout,

    /// Unconditional retry after `wait`, optionally ahead of the backlog
    Generic { wait: Duration, jump_in_line: bool },
}

impl FetchOutcome {
    pub fn timeout() -> Self {
        Self::Retryable(RetryKind::Timeout)
    }

    pub fn retry(wait: Duration, jump_in_line: bool) -> Self {
        Self::Retryable(RetryKind::Generic { wait, jump_in_line })
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal(reason.into())
    }
}

/// A completed transfer
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// Final URL after redirects
    pub url: String,
    /// Status code
    pub status: u16,
    /// Response headers, lowercased names
    pub headers: BTreeMap<String, String>,
    /// Raw body
    pub body: Vec<u8>,
    /// Wall time spent in the transfer
    pub elapsed: Duration,
}

impl Response {
    /// Builds a 200 response with a text body; handy for scripted fetchers
    pub fn ok(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            body: body.into(),
            ..Self::default()
        }
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON
    pub fn json(&self) -> serde_json::Result<Value> {
        serde_json::from_slice(&self.body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Performs the transfer for a work item
///
/// Implementations must classify every failure; they never see scheduler state.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, item: &WorkItem) -> FetchOutcome;
}

/// Builds an HTTP client with the configured user agent
///
/// Redirects are followed by reqwest; per-request timeouts come from the work item.
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(Duration::from_millis(config.connect_timeout))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Default fetcher backed by `reqwest`
///
/// # Outcome Classification
///
/// | Condition | Outcome |
/// |-----------|---------|
/// | 2xx / 3xx | Success |
/// | Status listed in `retry-statuses` | Generic retry after `retry-wait` |
/// | Any other status >= 400 | Fatal (`HTTP <code>`) |
/// | Transfer timeout | Timeout retry |
/// | Connection refused, TLS, DNS | Fatal |
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    retry_statuses: Vec<u16>,
    retry_wait: Duration,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            retry_statuses: config.retry_statuses.clone(),
            retry_wait: Duration::from_millis(config.retry_wait),
        })
    }

    fn build_request(&self, item: &WorkItem) -> reqwest::RequestBuilder {
        let method = match item.method() {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
        };

        let mut request = self
            .client
            .request(method, item.target().clone())
            .timeout(item.timeout())
            .headers(to_header_map(item.headers()));

        // GET and HEAD carry object payloads as query parameters, everything else as JSON
        match (item.method(), item.payload()) {
            (_, Value::Null) => {}
            (Method::Get | Method::Head, Value::Object(map)) => {
                let params: Vec<(String, String)> = map
                    .iter()
                    .map(|(k, v)| match v {
                        Value::String(s) => (k.clone(), s.clone()),
                        other => (k.clone(), other.to_string()),
                    })
                    .collect();
                request = request.query(&params);
            }
            (_, payload) => {
                request = request.json(payload);
            }
        }

        request
    }

    fn classify_status(&self, status: u16) -> Option<FetchOutcome> {
        if status < 400 {
            return None;
        }
        if self.retry_statuses.contains(&status) {
            return Some(FetchOutcome::retry(self.retry_wait, false));
        }
        Some(FetchOutcome::fatal(format!("HTTP {}", status)))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, item: &WorkItem) -> FetchOutcome {
        let started = std::time::Instant::now();

        let response = match self.build_request(item).send().await {
            Ok(response) => response,
            Err(e) => return classify_error(&e),
        };

        let status = response.status().as_u16();
        if let Some(outcome) = self.classify_status(status) {
            tracing::debug!(item = %item.label(), status, "Filtered response");
            return outcome;
        }

        let url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        match response.bytes().await {
            Ok(body) => FetchOutcome::Success(Response {
                url,
                status,
                headers,
                body: body.to_vec(),
                elapsed: started.elapsed(),
            }),
            Err(e) => classify_error(&e),
        }
    }
}

/// Maps a transport error onto an outcome
fn classify_error(error: &reqwest::Error) -> FetchOutcome {
    if error.is_timeout() {
        FetchOutcome::timeout()
    } else if error.is_connect() {
        FetchOutcome::fatal(format!("Connection failed: {}", error))
    } else {
        FetchOutcome::fatal(error.to_string())
    }
}

fn to_header_map(headers: &BTreeMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "Skipping invalid header"),
        }
    }
    map
}
