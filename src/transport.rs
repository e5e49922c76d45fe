// Transport seam between the loader and the network.
// HttpTransport is the reqwest-backed implementation; the cache shim and the
// test mocks implement the same trait so they can be stacked in front of it.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, PRAGMA};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Request blocked: {0}")]
    Blocked(String),

    #[error("Transport timed out")]
    TimedOut,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

// How the request is issued. Xhr-style requests identify themselves the way
// XMLHttpRequest does, which some proxies and dev servers treat differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Fetch,
    Xhr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDirective {
    Default,
    NoCache,
    NoStore,
    Reload,
}

impl CacheDirective {
    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            CacheDirective::Default => None,
            CacheDirective::NoCache => Some("no-cache"),
            CacheDirective::NoStore => Some("no-store"),
            CacheDirective::Reload => Some("no-cache, no-store, must-revalidate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub kind: TransportKind,
    pub cache: CacheDirective,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: TransportKind::Fetch,
            cache: CacheDirective::Default,
            headers: Vec::new(),
        }
    }

    pub fn with_cache(mut self, cache: CacheDirective) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_kind(mut self, kind: TransportKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn header_map(&self) -> Result<HeaderMap, TransportError> {
        let mut map = HeaderMap::new();

        if let Some(value) = self.cache.header_value() {
            map.insert(CACHE_CONTROL, HeaderValue::from_static(value));
            if self.cache != CacheDirective::NoStore {
                map.insert(PRAGMA, HeaderValue::from_static("no-cache"));
            }
        }

        if self.kind == TransportKind::Xhr {
            map.insert(
                HeaderName::from_static("x-requested-with"),
                HeaderValue::from_static("XMLHttpRequest"),
            );
        }

        // Explicit strategy headers win over the directive defaults
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            map.insert(name, value);
        }

        Ok(map)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub url: String,
    pub status: u16,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    // A non-2xx status is still an Ok response; only transport-level
    // failures are errors.
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError> {
        (**self).send(request).await
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        // Deadlines belong to the loader's strategies, not the client
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError> {
        let headers = request.header_map()?;
        debug!(url = %request.url, kind = ?request.kind, cache = ?request.cache, "sending request");

        let response = self
            .client
            .get(&request.url)
            .headers(headers)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let body = response.bytes().await.map_err(classify_reqwest_error)?;

        Ok(FetchResponse { url, status, body })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::TimedOut
    } else if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Blocked(err.to_string())
    }
}
