//! HTTP transport seam.
//!
//! `ApiClient` and `RefreshCoordinator` never talk to reqwest directly; they
//! hand a fully built `HttpRequest` to an `HttpTransport`. Production uses
//! `ReqwestTransport`; tests script responses in memory.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ApiError;

pub use reqwest::Method;

/// A request ready to go on the wire.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self.header("Content-Type", "application/json")
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Token from the `Authorization: Bearer` header, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.header_value("Authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
    }

    /// Everything after the host: path plus any query string.
    pub fn path_and_query(&self) -> &str {
        match self.url.find("://") {
            Some(scheme_end) => {
                let rest = &self.url[scheme_end + 3..];
                match rest.find('/') {
                    Some(idx) => &rest[idx..],
                    None => "/",
                }
            }
            None => &self.url,
        }
    }
}

/// Status and raw body of a completed exchange.
#[derive(Debug, Clone, PartialEq)]
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

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// reqwest-backed transport (rustls, connection pooling).
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;
        Ok(HttpResponse { status, body })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

/// Whole seconds for error reporting, rounded up so short timeouts never read as 0.
fn timeout_secs(timeout: Duration) -> u64 {
    (timeout.as_millis() as u64).div_ceil(1000)
}

/// Send through `transport`, aborting the exchange once `timeout` elapses.
///
/// Dropping the transport future cancels the underlying call.
pub(crate) async fn send_with_timeout(
    transport: &dyn HttpTransport,
    request: HttpRequest,
    timeout: Duration,
) -> Result<HttpResponse, ApiError> {
    let method = request.method.clone();
    let url = request.url.clone();

    match tokio::time::timeout(timeout, transport.send(request)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(TransportError::Timeout)) | Err(_) => {
            log::warn!(
                "ApiClient: {} {} aborted after {:?}",
                method,
                url,
                timeout
            );
            Err(ApiError::RequestTimeout(timeout_secs(timeout)))
        }
        Ok(Err(err)) => {
            log::error!("ApiClient: {} {} failed: {}", method, url, err);
            Err(ApiError::Network(err.to_string()))
        }
    }
}
