//! In-memory transport for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use super::{ApiClient, SessionListener};
use crate::session::{SessionCredentials, TokenStore};

pub(crate) const BASE_URL: &str = "http://dashboard.test";

/// What the scripted server does with one request.
pub(crate) struct Reply {
    pub result: Result<HttpResponse, TransportError>,
    pub delay: Duration,
}

impl Reply {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            result: Ok(HttpResponse::new(status, body.to_string())),
            delay: Duration::ZERO,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            result: Ok(HttpResponse::new(status, body)),
            delay: Duration::ZERO,
        }
    }

    pub fn error(err: TransportError) -> Self {
        Self {
            result: Err(err),
            delay: Duration::ZERO,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Handler = Box<dyn Fn(&HttpRequest) -> Reply + Send + Sync>;

/// Transport whose responses come from a closure; records every request.
pub(crate) struct ScriptedTransport {
    handler: Handler,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(handler: impl Fn(&HttpRequest) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Requests whose path (query string included) starts with `prefix`.
    pub fn requests_to(&self, prefix: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.path_and_query().starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let reply = (self.handler)(&request);
        self.requests.lock().push(request);
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.result
    }
}

/// Counts auth-failure notifications.
#[derive(Default)]
pub(crate) struct CountingListener {
    pub expired: AtomicUsize,
}

impl CountingListener {
    pub fn count(&self) -> usize {
        self.expired.load(Ordering::SeqCst)
    }
}

impl SessionListener for CountingListener {
    fn on_session_expired(&self) {
        self.expired.fetch_add(1, Ordering::SeqCst);
    }
}

/// Token store seeded with `access`/`refresh`.
pub(crate) fn seeded_store(access: &str, refresh: &str) -> TokenStore {
    let store = TokenStore::in_memory();
    store
        .save_credentials(&SessionCredentials::new(access, refresh))
        .expect("seed credentials");
    store
}

/// Client over `transport` with a 10 second default timeout.
pub(crate) fn client_with(
    transport: Arc<ScriptedTransport>,
    store: TokenStore,
    listener: Arc<CountingListener>,
) -> ApiClient {
    ApiClient::builder(BASE_URL)
        .store(store)
        .transport(transport)
        .timeout(Duration::from_secs(10))
        .session_listener(listener)
        .build()
}
