//! Error types for dashboard API calls
//!
//! Errors are classified by recoverability:
//! - Retryable: network issues, timeouts, rate limits, 5xx
//! - NonRetryable: bad requests, undecodable responses, local storage faults
//! - RequiresUserAction: expired session, missing permissions

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body shape returned by the dashboard backend.
///
/// Every field is optional; bodies that are not JSON at all parse as the
/// default (all `None`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub retry_after_seconds: Option<u64>,
    #[serde(default)]
    pub remaining_attempts: Option<u32>,
    #[serde(default)]
    pub reset_time: Option<serde_json::Value>,
}

impl ErrorBody {
    /// Parse an error body, tolerating empty and non-JSON payloads.
    pub fn parse(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }
}

/// Cooldown hints attached to a 429 response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitHints {
    pub retry_after_seconds: Option<u64>,
    pub remaining_attempts: Option<u32>,
    /// Backend sends either epoch millis or an ISO string; kept verbatim.
    pub reset_time: Option<serde_json::Value>,
}

/// Errors surfaced by the request client and everything built on it.
///
/// `Clone` so a single refresh failure can be handed to every caller queued
/// behind it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{message}")]
    RateLimited {
        message: String,
        hints: RateLimitHints,
    },

    #[error("Request timed out after {0} seconds")]
    RequestTimeout(u64),

    #[error("Request failed ({status}): {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ApiError {
    /// Classify a non-2xx response into the typed taxonomy.
    ///
    /// 401 lands here only when no refresh path was available.
    pub fn from_status(status: u16, body: &ErrorBody) -> Self {
        let server_message = body.error.clone().or_else(|| body.message.clone());
        match status {
            429 => ApiError::RateLimited {
                message: body.error.clone().unwrap_or_else(|| "Rate limited".to_string()),
                hints: RateLimitHints {
                    retry_after_seconds: body.retry_after_seconds,
                    remaining_attempts: body.remaining_attempts,
                    reset_time: body.reset_time.clone(),
                },
            },
            401 => ApiError::Unauthorized(
                body.error.clone().unwrap_or_else(|| "Unauthorized".to_string()),
            ),
            403 => ApiError::Forbidden(body.error.clone().unwrap_or_else(|| "Forbidden".to_string())),
            _ => ApiError::RequestFailed {
                status,
                message: server_message.unwrap_or_else(|| format!("Request failed: {}", status)),
            },
        }
    }

    /// HTTP status associated with this error, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized(_) | ApiError::AuthenticationFailed(_) => Some(401),
            ApiError::Forbidden(_) => Some(403),
            ApiError::RateLimited { .. } => Some(429),
            ApiError::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if repeating the same request later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::RequestTimeout(_) | ApiError::RateLimited { .. } => {
                true
            }
            ApiError::RequestFailed { status, .. } => *status >= 500 || *status == 408,
            _ => false,
        }
    }

    /// Returns true if the user has to sign in again or ask for access
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            ApiError::NoRefreshToken
                | ApiError::AuthenticationFailed(_)
                | ApiError::Unauthorized(_)
                | ApiError::Forbidden(_)
        )
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ApiError::NoRefreshToken
            | ApiError::AuthenticationFailed(_)
            | ApiError::Unauthorized(_) => "Your session has ended. Sign in again.",
            ApiError::Forbidden(_) => "Your account does not have access to this page.",
            ApiError::RateLimited { .. } => "Too many attempts. Wait a moment and try again.",
            ApiError::RequestTimeout(_) => "The server took too long to respond. Try again.",
            ApiError::RequestFailed { .. } => "The request could not be completed. Try again.",
            ApiError::RefreshFailed(_) => "Sign in again to continue.",
            ApiError::Network(_) => "Check your internet connection and try again.",
            ApiError::InvalidResponse(_) => "The server sent an unexpected response.",
            ApiError::Storage(_) => "Check that the session file is writable.",
            ApiError::Config(_) => "Check ~/.tenant-dashboard/config.json.",
            ApiError::Validation(_) => "Fix the highlighted fields and save again.",
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidResponse(err.to_string())
    }
}

impl From<crate::session::StorageError> for ApiError {
    fn from(err: crate::session::StorageError) -> Self {
        ApiError::Storage(err.to_string())
    }
}

/// Serializable error representation for UI layers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
    pub error_type: ErrorType,
    pub can_retry: bool,
    pub recovery_suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitHints>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorType {
    Retryable,
    NonRetryable,
    RequiresUserAction,
}

impl From<&ApiError> for ErrorPayload {
    fn from(err: &ApiError) -> Self {
        let error_type = if err.requires_user_action() {
            ErrorType::RequiresUserAction
        } else if err.is_retryable() {
            ErrorType::Retryable
        } else {
            ErrorType::NonRetryable
        };

        let rate_limit = match err {
            ApiError::RateLimited { hints, .. } => Some(hints.clone()),
            _ => None,
        };

        ErrorPayload {
            message: err.to_string(),
            error_type,
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
            status: err.status(),
            rate_limit,
        }
    }
}
