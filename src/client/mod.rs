//! Resilient request client for the dashboard REST API.
//!
//! `ApiClient` attaches the stored bearer token to every request, recovers
//! from an expired access token with one single-flight refresh and one retry,
//! and turns error responses into typed `ApiError`s. Cloning is cheap; clones
//! share the token store and the refresh coordinator.
//!
//! Modules:
//! - refresh: single-flight token refresh
//! - transport: HTTP seam (reqwest in production)

pub mod refresh;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ClientConfig;
use crate::error::{ApiError, ErrorBody};
use crate::session::{FileStorage, TokenStore};

pub use refresh::RefreshCoordinator;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};

/// Default timeout when neither the builder nor the request sets one.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Notified when the session ends because refresh or the post-refresh retry
/// failed. UI hosts navigate back to the application root here.
pub trait SessionListener: Send + Sync {
    fn on_session_expired(&self);
}

/// Per-request settings.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<serde_json::Value>,
    /// Overrides the client's default timeout.
    pub timeout: Option<Duration>,
    /// When false, no bearer token is attached and a 401 never triggers a
    /// refresh (login, register, password reset).
    pub authenticated: bool,
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            body: None,
            timeout: None,
            authenticated: true,
            headers: Vec::new(),
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    /// Request with a JSON body.
    pub fn json(method: Method, body: &impl Serialize) -> Result<Self, ApiError> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::Validation(format!("could not encode request body: {}", e)))?;
        Ok(Self {
            body: Some(body),
            ..Self::new(method)
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn public(mut self) -> Self {
        self.authenticated = false;
        self
    }
}

struct ClientInner {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    store: TokenStore,
    refresh: RefreshCoordinator,
    timeout: Duration,
    listener: Option<Arc<dyn SessionListener>>,
}

#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url)
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

pub struct ApiClientBuilder {
    base_url: String,
    store: Option<TokenStore>,
    transport: Option<Arc<dyn HttpTransport>>,
    timeout: Duration,
    listener: Option<Arc<dyn SessionListener>>,
}

impl ApiClientBuilder {
    pub fn store(mut self, store: TokenStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn session_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn build(self) -> ApiClient {
        let base_url = self.base_url.trim_end_matches('/').to_string();
        let store = self.store.unwrap_or_else(TokenStore::in_memory);
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));
        let refresh =
            RefreshCoordinator::new(&base_url, transport.clone(), store.clone(), self.timeout);

        ApiClient {
            inner: Arc::new(ClientInner {
                base_url,
                transport,
                store,
                refresh,
                timeout: self.timeout,
                listener: self.listener,
            }),
        }
    }
}

impl ApiClient {
    pub fn builder(base_url: &str) -> ApiClientBuilder {
        ApiClientBuilder {
            base_url: base_url.to_string(),
            store: None,
            transport: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            listener: None,
        }
    }

    /// Builder preset from `config`: reqwest transport, file-backed session.
    pub fn configured(config: &ClientConfig) -> Result<ApiClientBuilder, ApiError> {
        let base_url = config.base_url()?;
        let storage = FileStorage::open(config.session_file()?)?;
        Ok(Self::builder(&base_url)
            .store(TokenStore::new(Arc::new(storage)))
            .timeout(config.request_timeout()))
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        Ok(Self::configured(config)?.build())
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn store(&self) -> &TokenStore {
        &self.inner.store
    }

    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.inner.refresh
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request(endpoint, RequestOptions::get()).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &impl Serialize,
    ) -> Result<T, ApiError> {
        self.request(endpoint, RequestOptions::json(Method::POST, body)?)
            .await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &impl Serialize,
    ) -> Result<T, ApiError> {
        self.request(endpoint, RequestOptions::json(Method::PUT, body)?)
            .await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &impl Serialize,
    ) -> Result<T, ApiError> {
        self.request(endpoint, RequestOptions::json(Method::PATCH, body)?)
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request(endpoint, RequestOptions::delete()).await
    }

    /// Issue a request and decode the JSON response into `T`.
    ///
    /// On a 401 with a stored refresh token the request is retried exactly
    /// once with a refreshed token. If that refresh or the retry fails, the
    /// session is cleared, the listener is notified and
    /// `AuthenticationFailed` is returned.
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let url = self.url_for(endpoint);
        let sent_token = if options.authenticated {
            self.inner.store.access_token()?
        } else {
            None
        };

        let response = self.send(&url, &options, sent_token.as_deref()).await?;

        if response.status == 401
            && options.authenticated
            && self.inner.store.refresh_token()?.is_some()
        {
            return self
                .retry_with_fresh_token(&url, &options, sent_token.as_deref())
                .await;
        }

        decode_response(&options.method, &url, response)
    }

    async fn retry_with_fresh_token<T: DeserializeOwned>(
        &self,
        url: &str,
        options: &RequestOptions,
        sent_token: Option<&str>,
    ) -> Result<T, ApiError> {
        // A concurrent request may already have rotated the token while this
        // one was in flight; reuse it instead of refreshing again.
        let current = self.inner.store.access_token()?;
        let token = match current {
            Some(current) if Some(current.as_str()) != sent_token => {
                log::debug!("ApiClient: token rotated during request, retrying {}", url);
                current
            }
            _ => match self.inner.refresh.execute_refresh().await {
                Ok(token) => token,
                Err(e) => return Err(self.end_session(format!("refresh failed: {}", e))),
            },
        };

        let retry = match self.send(url, options, Some(&token)).await {
            Ok(retry) => retry,
            Err(e) => return Err(self.end_session(format!("retry failed: {}", e))),
        };
        if !retry.is_success() {
            return Err(self.end_session(format!("retry returned HTTP {}", retry.status)));
        }

        decode_body(&retry.body)
    }

    /// Hard auth failure: drop every session key and tell the host.
    fn end_session(&self, reason: String) -> ApiError {
        log::warn!("ApiClient: ending session: {}", reason);
        if let Err(e) = self.inner.store.clear() {
            log::error!("ApiClient: failed to clear session storage: {}", e);
        }
        if let Some(listener) = &self.inner.listener {
            listener.on_session_expired();
        }
        ApiError::AuthenticationFailed(reason)
    }

    async fn send(
        &self,
        url: &str,
        options: &RequestOptions,
        token: Option<&str>,
    ) -> Result<HttpResponse, ApiError> {
        let mut request = HttpRequest::new(options.method.clone(), url);
        for (name, value) in &options.headers {
            request = request.header(name, value.clone());
        }
        if let Some(token) = token {
            request = request.bearer(token);
        }
        if let Some(body) = &options.body {
            request = request.json(body.clone());
        }

        let timeout = options.timeout.unwrap_or(self.inner.timeout);
        transport::send_with_timeout(self.inner.transport.as_ref(), request, timeout).await
    }

    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{}", self.inner.base_url, endpoint)
        } else {
            format!("{}/{}", self.inner.base_url, endpoint)
        }
    }
}

fn decode_response<T: DeserializeOwned>(
    method: &Method,
    url: &str,
    response: HttpResponse,
) -> Result<T, ApiError> {
    if response.is_success() {
        return decode_body(&response.body);
    }

    let body = ErrorBody::parse(&response.body);
    let err = ApiError::from_status(response.status, &body);
    log::warn!("ApiClient: {} {} -> {}: {}", method, url, response.status, err);
    Err(err)
}

/// Decode a 2xx body. An empty body is treated as JSON `null`.
fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    let raw = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(raw).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::testing::{
        client_with, seeded_store, CountingListener, Reply, ScriptedTransport,
    };
    use super::*;
    use crate::client::refresh::REFRESH_PATH;
    use crate::client::transport::TransportError;
    use crate::session::SessionCredentials;
    use tokio::task::JoinSet;

    fn tenant_json() -> serde_json::Value {
        serde_json::json!({"slug": "acme", "business_name": "Acme Mobile Detailing"})
    }

    /// Server that accepts only `valid` as a bearer token and rotates R1 -> A2/R2.
    fn rotating_server(valid: &'static str) -> Arc<ScriptedTransport> {
        ScriptedTransport::new(move |req| {
            if req.path_and_query() == REFRESH_PATH {
                return Reply::json(
                    200,
                    serde_json::json!({"accessToken": "A2", "refreshToken": "R2"}),
                )
                .after(Duration::from_millis(100));
            }
            if req.bearer_token() == Some(valid) {
                Reply::json(200, tenant_json())
            } else {
                Reply::json(401, serde_json::json!({"error": "Token expired"}))
            }
        })
    }

    #[tokio::test]
    async fn test_attaches_bearer_token() {
        let transport = ScriptedTransport::new(|_| Reply::json(200, tenant_json()));
        let listener = Arc::new(CountingListener::default());
        let client = client_with(transport.clone(), seeded_store("A1", "R1"), listener);

        let tenant: serde_json::Value = client.get("/api/tenants/acme").await.unwrap();

        assert_eq!(tenant["slug"], "acme");
        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].bearer_token(), Some("A1"));
        assert_eq!(sent[0].url, "http://dashboard.test/api/tenants/acme");
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_and_retries_once() {
        let transport = rotating_server("A2");
        let listener = Arc::new(CountingListener::default());
        let store = seeded_store("A1", "R1");
        let client = client_with(transport.clone(), store.clone(), listener.clone());

        let tenant: serde_json::Value = client.get("/api/tenants/acme").await.unwrap();

        assert_eq!(tenant, tenant_json());
        let sent = transport.requests();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].bearer_token(), Some("A1"));
        assert_eq!(sent[1].path_and_query(), REFRESH_PATH);
        assert_eq!(sent[1].body.as_ref().unwrap()["refreshToken"], "R1");
        assert_eq!(sent[2].path_and_query(), "/api/tenants/acme");
        assert_eq!(sent[2].bearer_token(), Some("A2"));
        assert_eq!(
            store.credentials().unwrap(),
            Some(SessionCredentials::new("A2", "R2"))
        );
        assert_eq!(listener.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_401s_share_one_refresh() {
        let transport = rotating_server("A2");
        let listener = Arc::new(CountingListener::default());
        let client = client_with(transport.clone(), seeded_store("A1", "R1"), listener);

        let mut tasks = JoinSet::new();
        for i in 0..6 {
            let client = client.clone();
            tasks.spawn(async move {
                client
                    .get::<serde_json::Value>(&format!("/api/tenants/acme?page={}", i))
                    .await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap().unwrap();
        }

        assert_eq!(transport.requests_to(REFRESH_PATH).len(), 1);
        let retried: Vec<_> = transport
            .requests_to("/api/tenants/acme")
            .into_iter()
            .filter(|r| r.bearer_token() == Some("A2"))
            .collect();
        assert_eq!(retried.len(), 6);
    }

    #[tokio::test]
    async fn test_failed_retry_ends_session() {
        // Server rejects every token, including the refreshed one.
        let transport = rotating_server("never-valid");
        let listener = Arc::new(CountingListener::default());
        let store = seeded_store("A1", "R1");
        let client = client_with(transport.clone(), store.clone(), listener.clone());

        let err = client
            .get::<serde_json::Value>("/api/tenants/acme")
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::AuthenticationFailed(_)));
        assert_eq!(transport.requests().len(), 3);
        assert!(store.access_token().unwrap().is_none());
        assert!(store.refresh_token().unwrap().is_none());
        assert_eq!(listener.count(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_ends_session() {
        let transport = ScriptedTransport::new(|req| {
            if req.path_and_query() == REFRESH_PATH {
                Reply::json(500, serde_json::json!({"error": "db down"}))
            } else {
                Reply::json(401, serde_json::json!({"error": "Token expired"}))
            }
        });
        let listener = Arc::new(CountingListener::default());
        let store = seeded_store("A1", "R1");
        let client = client_with(transport, store.clone(), listener.clone());

        let err = client
            .get::<serde_json::Value>("/api/tenants/acme")
            .await
            .unwrap_err();

        match err {
            ApiError::AuthenticationFailed(reason) => assert!(reason.contains("db down")),
            other => panic!("expected AuthenticationFailed, got {:?}", other),
        }
        assert!(store.credentials().unwrap().is_none());
        assert_eq!(listener.count(), 1);
    }

    #[tokio::test]
    async fn test_401_without_refresh_token_is_unauthorized() {
        let transport =
            ScriptedTransport::new(|_| Reply::json(401, serde_json::json!({"error": "Login required"})));
        let listener = Arc::new(CountingListener::default());
        let client = client_with(transport.clone(), TokenStore::in_memory(), listener.clone());

        let err = client
            .get::<serde_json::Value>("/api/auth/me")
            .await
            .unwrap_err();

        assert_eq!(err, ApiError::Unauthorized("Login required".to_string()));
        assert_eq!(transport.requests().len(), 1);
        assert!(transport.requests()[0].bearer_token().is_none());
        assert_eq!(listener.count(), 0);
    }

    #[tokio::test]
    async fn test_public_request_skips_token_and_refresh() {
        let transport = ScriptedTransport::new(|_| {
            Reply::json(401, serde_json::json!({"error": "Invalid email or password"}))
        });
        let listener = Arc::new(CountingListener::default());
        let store = seeded_store("A1", "R1");
        let client = client_with(transport.clone(), store.clone(), listener.clone());

        let options = RequestOptions::json(
            Method::POST,
            &serde_json::json!({"email": "owner@acme.test", "password": "wrong"}),
        )
        .unwrap()
        .public();
        let err = client
            .request::<serde_json::Value>("/api/auth/login", options)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ApiError::Unauthorized("Invalid email or password".to_string())
        );
        assert_eq!(transport.requests().len(), 1);
        assert!(transport.requests()[0].bearer_token().is_none());
        assert!(store.credentials().unwrap().is_some());
        assert_eq!(listener.count(), 0);
    }

    #[tokio::test]
    async fn test_error_classification() {
        let transport = ScriptedTransport::new(|req| match req.path_and_query() {
            "/api/forbidden" => Reply::json(403, serde_json::json!({"error": "Admins only"})),
            "/api/limited" => Reply::json(
                429,
                serde_json::json!({"error": "Slow down", "retryAfterSeconds": 30, "remainingAttempts": 2}),
            ),
            "/api/broken" => Reply::text(502, "<html>Bad Gateway</html>"),
            _ => Reply::json(404, serde_json::json!({"message": "Tenant not found"})),
        });
        let listener = Arc::new(CountingListener::default());
        let client = client_with(transport, seeded_store("A1", "R1"), listener);

        let err = client.get::<serde_json::Value>("/api/forbidden").await.unwrap_err();
        assert_eq!(err, ApiError::Forbidden("Admins only".to_string()));

        let err = client.get::<serde_json::Value>("/api/limited").await.unwrap_err();
        match err {
            ApiError::RateLimited { message, hints } => {
                assert_eq!(message, "Slow down");
                assert_eq!(hints.retry_after_seconds, Some(30));
                assert_eq!(hints.remaining_attempts, Some(2));
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }

        let err = client.get::<serde_json::Value>("/api/broken").await.unwrap_err();
        assert_eq!(
            err,
            ApiError::RequestFailed {
                status: 502,
                message: "Request failed: 502".to_string()
            }
        );

        let err = client.get::<serde_json::Value>("/api/missing").await.unwrap_err();
        assert_eq!(
            err,
            ApiError::RequestFailed {
                status: 404,
                message: "Tenant not found".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_request_times_out() {
        let transport = ScriptedTransport::new(|_| {
            Reply::json(200, tenant_json()).after(Duration::from_secs(120))
        });
        let listener = Arc::new(CountingListener::default());
        let client = client_with(transport, seeded_store("A1", "R1"), listener);

        let err = client
            .request::<serde_json::Value>(
                "/api/schedule/appointments",
                RequestOptions::get().with_timeout(Duration::from_secs(10)),
            )
            .await
            .unwrap_err();

        assert_eq!(err, ApiError::RequestTimeout(10));
    }

    #[tokio::test]
    async fn test_network_failure_surfaces() {
        let transport = ScriptedTransport::new(|_| {
            Reply::error(TransportError::Other("dns error".to_string()))
        });
        let listener = Arc::new(CountingListener::default());
        let client = client_with(transport, seeded_store("A1", "R1"), listener);

        let err = client.get::<serde_json::Value>("/api/tenants/acme").await.unwrap_err();
        assert_eq!(err, ApiError::Network("dns error".to_string()));
    }

    #[tokio::test]
    async fn test_empty_body_decodes_as_null() {
        let transport = ScriptedTransport::new(|_| Reply::text(204, ""));
        let listener = Arc::new(CountingListener::default());
        let client = client_with(transport, seeded_store("A1", "R1"), listener);

        client
            .delete::<()>("/api/schedule/blocked-days/2026-10-20")
            .await
            .unwrap();

        let maybe: Option<serde_json::Value> = client.delete("/api/x").await.unwrap();
        assert!(maybe.is_none());
    }

    #[tokio::test]
    async fn test_undecodable_success_body() {
        let transport = ScriptedTransport::new(|_| Reply::text(200, "<!doctype html>"));
        let listener = Arc::new(CountingListener::default());
        let client = client_with(transport, seeded_store("A1", "R1"), listener);

        let err = client.get::<serde_json::Value>("/api/tenants/acme").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_json_body_and_relative_endpoint() {
        let transport = ScriptedTransport::new(|req| {
            Reply::json(200, req.body.clone().unwrap_or(serde_json::Value::Null))
        });
        let listener = Arc::new(CountingListener::default());
        let client = client_with(transport.clone(), seeded_store("A1", "R1"), listener);

        let echoed: serde_json::Value = client
            .put("api/tenants/acme/profile", &serde_json::json!({"business_name": "Ace Co"}))
            .await
            .unwrap();

        assert_eq!(echoed["business_name"], "Ace Co");
        let sent = &transport.requests()[0];
        assert_eq!(sent.method, Method::PUT);
        assert_eq!(sent.path_and_query(), "/api/tenants/acme/profile");
        assert_eq!(sent.header_value("Content-Type"), Some("application/json"));
    }
}
