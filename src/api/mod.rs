//! Typed wrappers over the dashboard REST endpoints.
//!
//! Every call goes through `ApiClient`, so bearer handling, refresh and
//! error classification are shared.
//!
//! Modules:
//! - auth: login, logout, current user
//! - tenants: tenant record and profile field autosave
//! - website_content: website copy editor
//! - schedule: blocked days calendar
//! - services: pricing editor list/load/save/delete

pub mod auth;
pub mod schedule;
pub mod services;
pub mod tenants;
pub mod website_content;

use serde::Deserialize;

use crate::error::ApiError;

/// `{ success, data }` wrapper used by most tenant-facing routes.
#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    #[serde(default)]
    pub success: Option<bool>,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> DataEnvelope<T> {
    /// Unwrap `data`, treating `success: false` or a missing payload as an
    /// invalid response.
    pub fn into_data(self, what: &str) -> Result<T, ApiError> {
        self.ensure_success(what)?
            .ok_or_else(|| ApiError::InvalidResponse(format!("{}: response has no data", what)))
    }

    /// Like `into_data`, for routes that may answer without a payload.
    pub fn ensure_success(self, what: &str) -> Result<Option<T>, ApiError> {
        if self.success == Some(false) {
            return Err(ApiError::InvalidResponse(format!(
                "{}: {}",
                what,
                self.error.unwrap_or_else(|| "server reported failure".to_string())
            )));
        }
        Ok(self.data)
    }
}

/// Percent-encode a single path segment (slugs, ids).
pub(crate) fn segment(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
