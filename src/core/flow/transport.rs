//! HTTP boundary used by session flows and the traffic replayer.
//!
//! Everything above this module talks to the target API through
//! [`HttpTransport`]: send a request, get back status, body and latency.
//! [`ReqwestTransport`] is the production implementation; tests substitute
//! scripted transports or point it at a `wiremock` server.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::errors::{FlowError, FlowResult};

/// Accept header sent for HTML page loads
pub const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Browser identity presented on page loads and inside play payloads
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiMethod {
    Get,
    Post,
}

impl ApiMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request relative to the transport's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: ApiMethod,
    /// Path relative to the base URL, e.g. `api/v1/plays`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Page loads ask for HTML with a browser user agent
    pub html: bool,
}

impl ApiRequest {
    /// GET of an HTML page
    pub fn page(path: impl Into<String>) -> Self {
        Self {
            method: ApiMethod::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
            html: true,
        }
    }

    /// GET of a JSON API resource
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            html: false,
            ..Self::page(path)
        }
    }

    /// POST with a JSON body
    pub fn post_json(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: ApiMethod::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
            html: false,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
    pub latency: Duration,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Fail with [`FlowError::HttpStatus`] on a non-2xx status.
    pub fn ensure_success(self, path: &str) -> FlowResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(FlowError::HttpStatus {
                path: path.to_string(),
                status: self.status,
            })
        }
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }
}

/// Sends requests to the target API.
///
/// Implementations report connection-level failures as
/// [`FlowError::Transport`] and return every HTTP response, whatever its
/// status, as `Ok`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> FlowResult<ApiResponse>;
}

/// Connection settings for [`ReqwestTransport`].
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub base_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub headers: HashMap<String, String>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/".to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 64,
            headers: HashMap::new(),
        }
    }
}

/// [`HttpTransport`] over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl ReqwestTransport {
    pub fn new(options: &TransportOptions) -> FlowResult<Self> {
        let base_url = parse_base_url(&options.base_url)?;

        let mut headers = HeaderMap::new();
        for (key, value) in &options.headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(transport_setup)?;
            let value = HeaderValue::from_str(value).map_err(transport_setup)?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .connect_timeout(options.connect_timeout)
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .default_headers(headers)
            .build()
            .map_err(transport_setup)?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> FlowResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| FlowError::Transport {
                path: path.to_string(),
                message: format!("Invalid request path: {e}"),
            })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> FlowResult<ApiResponse> {
        let url = self.url_for(&request.path)?;

        let mut builder = match request.method {
            ApiMethod::Get => self.client.get(url),
            ApiMethod::Post => self.client.post(url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if request.html {
            builder = builder
                .header(ACCEPT, HTML_ACCEPT)
                .header(USER_AGENT, BROWSER_USER_AGENT);
        }
        if let Some(body) = &request.body {
            builder = builder.header(CONTENT_TYPE, "application/json").json(body);
        }

        let to_transport = |e: reqwest::Error| FlowError::Transport {
            path: request.path.clone(),
            message: e.to_string(),
        };

        let start = Instant::now();
        let response = builder.send().await.map_err(to_transport)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(to_transport)?;
        let latency = start.elapsed();

        debug!(
            method = %request.method,
            path = %request.path,
            status,
            latency_ms = latency.as_secs_f64() * 1000.0,
            "Request completed"
        );

        Ok(ApiResponse {
            status,
            body,
            latency,
        })
    }
}

/// Base URLs are joined against, so they must end with `/`.
fn parse_base_url(raw: &str) -> FlowResult<Url> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| FlowError::Transport {
        path: raw.to_string(),
        message: format!("Invalid base URL: {e}"),
    })
}

fn transport_setup(e: impl fmt::Display) -> FlowError {
    FlowError::Transport {
        path: String::new(),
        message: format!("Failed to build HTTP client: {e}"),
    }
}
