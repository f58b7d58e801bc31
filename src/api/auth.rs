//! Sign-in, sign-out and the current user.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::{ApiClient, Method, RequestOptions};
use crate::error::ApiError;
use crate::session::{SessionCredentials, SessionUser};

/// Auth endpoints answer within 10 seconds or not at all.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    /// Older deployments answer with `token` only.
    #[serde(alias = "token")]
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<SessionUser>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogoutRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    device_id: Option<&'a str>,
}

/// Exchange email and password for a session and persist it.
pub async fn login(
    client: &ApiClient,
    email: &str,
    password: &str,
) -> Result<Option<SessionUser>, ApiError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(ApiError::Validation(
            "Email and password are required".to_string(),
        ));
    }

    let options = RequestOptions::json(
        Method::POST,
        &LoginRequest {
            email: email.trim(),
            password,
        },
    )?
    .public()
    .with_timeout(AUTH_TIMEOUT);
    let response: LoginResponse = client.request("/api/auth/login", options).await?;

    if response.access_token.is_empty() {
        return Err(ApiError::InvalidResponse(
            "login response has no access token".to_string(),
        ));
    }
    let refresh_token = response.refresh_token.unwrap_or_default();
    if refresh_token.is_empty() {
        log::warn!("Auth: server issued no refresh token; session ends when the access token expires");
    }

    let store = client.store();
    store.clear()?;
    store.save_credentials(&SessionCredentials::new(response.access_token, refresh_token))?;
    if let Some(user) = &response.user {
        store.save_user(user)?;
    }

    log::info!("Auth: signed in as {}", email.trim());
    Ok(response.user)
}

/// End the session on the server (best effort) and always clear it locally.
pub async fn logout(client: &ApiClient, device_id: Option<&str>) -> Result<(), ApiError> {
    let signed_in = client.store().access_token()?.is_some();
    if signed_in {
        let options = RequestOptions::json(Method::POST, &LogoutRequest { device_id })?
            .with_timeout(AUTH_TIMEOUT);
        if let Err(e) = client
            .request::<serde_json::Value>("/api/auth/logout", options)
            .await
        {
            log::warn!("Auth: server logout failed, clearing local session anyway: {}", e);
        }
    }

    client.store().clear()?;
    log::info!("Auth: signed out");
    Ok(())
}

/// Fetch the signed-in user and refresh the cached copy.
pub async fn current_user(client: &ApiClient) -> Result<SessionUser, ApiError> {
    let user: SessionUser = client
        .request(
            "/api/auth/me",
            RequestOptions::get().with_timeout(AUTH_TIMEOUT),
        )
        .await?;
    client.store().save_user(&user)?;
    Ok(user)
}
