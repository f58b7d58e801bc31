//! Single-flight access token refresh.
//!
//! However many requests hit a 401 at the same moment, only one of them
//! posts to `/api/auth/refresh`. Everyone else parks on a oneshot channel in
//! the pending queue and receives the same outcome. The queue is drained in
//! one step when the refresh settles, including when the refreshing task is
//! dropped mid-flight.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::oneshot;

use super::transport::{send_with_timeout, HttpRequest, HttpTransport, Method};
use crate::error::{ApiError, ErrorBody};
use crate::session::{SessionCredentials, SessionUser, TokenStore};

/// Path of the refresh endpoint, relative to the API base URL.
pub const REFRESH_PATH: &str = "/api/auth/refresh";

type Waiter = oneshot::Sender<Result<String, ApiError>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    user: Option<serde_json::Value>,
}

pub struct RefreshCoordinator {
    url: String,
    transport: Arc<dyn HttpTransport>,
    store: TokenStore,
    timeout: Duration,
    /// `None` when idle; `Some(queue)` while a refresh is in flight.
    in_flight: Mutex<Option<Vec<Waiter>>>,
}

impl RefreshCoordinator {
    pub fn new(
        base_url: &str,
        transport: Arc<dyn HttpTransport>,
        store: TokenStore,
        timeout: Duration,
    ) -> Self {
        Self {
            url: format!("{}{}", base_url.trim_end_matches('/'), REFRESH_PATH),
            transport,
            store,
            timeout,
            in_flight: Mutex::new(None),
        }
    }

    /// Whether a refresh round-trip is currently outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    /// Obtain a fresh access token, sharing any refresh already in flight.
    ///
    /// On failure the stored credentials are left untouched; deciding whether
    /// to end the session is the caller's job.
    pub async fn execute_refresh(&self) -> Result<String, ApiError> {
        let waiter = {
            let mut slot = self.in_flight.lock();
            match slot.as_mut() {
                Some(queue) => {
                    let (tx, rx) = oneshot::channel();
                    queue.push(tx);
                    Some(rx)
                }
                None => {
                    *slot = Some(Vec::new());
                    None
                }
            }
        };

        if let Some(rx) = waiter {
            log::debug!("RefreshCoordinator: joining in-flight refresh");
            return rx.await.unwrap_or_else(|_| {
                Err(ApiError::RefreshFailed(
                    "refresh was cancelled before it settled".to_string(),
                ))
            });
        }

        let mut flight = InFlight {
            slot: &self.in_flight,
            settled: false,
        };
        let outcome = self.perform_refresh().await;
        let queued = flight.settle(&outcome);

        match &outcome {
            Ok(_) => log::info!(
                "RefreshCoordinator: access token refreshed ({} queued callers)",
                queued
            ),
            Err(e) => log::warn!(
                "RefreshCoordinator: refresh failed ({} queued callers): {}",
                queued,
                e
            ),
        }
        outcome
    }

    async fn perform_refresh(&self) -> Result<String, ApiError> {
        let refresh_token = self
            .store
            .refresh_token()?
            .ok_or(ApiError::NoRefreshToken)?;

        let request = HttpRequest::new(Method::POST, &self.url)
            .json(serde_json::json!({ "refreshToken": refresh_token }));
        let response = send_with_timeout(self.transport.as_ref(), request, self.timeout).await?;

        if !response.is_success() {
            let body = ErrorBody::parse(&response.body);
            let detail = body.error.or(body.message).unwrap_or_default();
            return Err(ApiError::RefreshFailed(format!(
                "HTTP {}: {}",
                response.status, detail
            )));
        }

        let parsed: RefreshResponse = serde_json::from_str(&response.body).map_err(|e| {
            ApiError::RefreshFailed(format!("unexpected refresh response: {}", e))
        })?;
        if parsed.access_token.is_empty() || parsed.refresh_token.is_empty() {
            return Err(ApiError::RefreshFailed(
                "refresh response is missing a token".to_string(),
            ));
        }

        let credentials = SessionCredentials::new(parsed.access_token, parsed.refresh_token);
        self.store.save_credentials(&credentials)?;

        if let Some(raw_user) = parsed.user {
            match serde_json::from_value::<SessionUser>(raw_user) {
                Ok(user) => {
                    if let Err(e) = self.store.save_user(&user) {
                        log::warn!("RefreshCoordinator: could not cache user: {}", e);
                    }
                }
                Err(e) => log::debug!("RefreshCoordinator: ignoring user payload: {}", e),
            }
        }

        Ok(credentials.access_token)
    }
}

/// Owns the in-flight marker for the refreshing task.
///
/// `settle` hands the outcome to every queued caller. If the task is dropped
/// first, `Drop` still clears the marker; the queued senders are dropped with
/// it and their callers see a cancellation error.
struct InFlight<'a> {
    slot: &'a Mutex<Option<Vec<Waiter>>>,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(&mut self, outcome: &Result<String, ApiError>) -> usize {
        let waiters = self.slot.lock().take().unwrap_or_default();
        self.settled = true;
        let count = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
        count
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.slot.lock().take();
        }
    }
}
