//! Session persistence for the dashboard client.
//!
//! The browser build kept tokens in localStorage under fixed keys. The same
//! keys are used here so a session file can be inspected (or seeded) by hand.
//!
//! Modules:
//! - storage: key-value backends (in-memory, JSON file)
//! - token_store: typed access to credentials and the cached user

pub mod storage;
pub mod token_store;

use serde::{Deserialize, Serialize};

pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError};
pub use token_store::TokenStore;

/// Storage key for the bearer access token.
pub const TOKEN_KEY: &str = "token";
/// Storage key for the long-lived refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
/// Storage key for the JSON-encoded signed-in user.
pub const USER_KEY: &str = "user";

/// Access/refresh token pair issued by login and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCredentials {
    pub access_token: String,
    pub refresh_token: String,
}

impl SessionCredentials {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// Signed-in user as returned by login, refresh and `/api/auth/me`.
///
/// Tenant users carry a `tenant_id`/`slug`; admins carry `is_admin`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: serde_json::Value,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_admin: Option<bool>,
    #[serde(default)]
    pub tenant_id: Option<serde_json::Value>,
    #[serde(default)]
    pub slug: Option<String>,
}
