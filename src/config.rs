//! Client configuration stored in ~/.tenant-dashboard/config.json
//!
//! Every field has a serde default, so a missing or partial file is valid.
//! `TENANT_DASHBOARD_API_URL` overrides `apiUrl` for local development.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Environment variable that overrides the configured API base URL.
pub const API_URL_ENV: &str = "TENANT_DASHBOARD_API_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Base URL the `/api/...` paths are appended to.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Timeout for ordinary requests.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Timeout for schedule and auth endpoints.
    #[serde(default = "default_schedule_timeout_secs")]
    pub schedule_timeout_secs: u64,
    /// Debounce window for autosave fields.
    #[serde(default = "default_autosave_debounce_ms")]
    pub autosave_debounce_ms: u64,
    /// How long a "Saved" indicator stays up before returning to idle.
    #[serde(default = "default_saved_indicator_ms")]
    pub saved_indicator_ms: u64,
    /// Session file; defaults to ~/.tenant-dashboard/session.json
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_path: Option<PathBuf>,
}

fn default_api_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_schedule_timeout_secs() -> u64 {
    10
}

fn default_autosave_debounce_ms() -> u64 {
    1000
}

fn default_saved_indicator_ms() -> u64 {
    2000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout_secs(),
            schedule_timeout_secs: default_schedule_timeout_secs(),
            autosave_debounce_ms: default_autosave_debounce_ms(),
            saved_indicator_ms: default_saved_indicator_ms(),
            session_path: None,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn schedule_timeout(&self) -> Duration {
        Duration::from_secs(self.schedule_timeout_secs)
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    pub fn saved_indicator(&self) -> Duration {
        Duration::from_millis(self.saved_indicator_ms)
    }

    /// Resolved session file location.
    pub fn session_file(&self) -> Result<PathBuf, ApiError> {
        match &self.session_path {
            Some(path) => Ok(path.clone()),
            None => state_dir().map(|dir| dir.join("session.json")),
        }
    }

    /// Validate and normalise the base URL (no trailing slash).
    pub fn base_url(&self) -> Result<String, ApiError> {
        let parsed = url::Url::parse(&self.api_url)
            .map_err(|e| ApiError::Config(format!("invalid apiUrl '{}': {}", self.api_url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ApiError::Config(format!(
                "apiUrl must be http(s), got '{}'",
                parsed.scheme()
            )));
        }
        Ok(self.api_url.trim_end_matches('/').to_string())
    }
}

/// Get the state directory (~/.tenant-dashboard)
pub fn state_dir() -> Result<PathBuf, ApiError> {
    let home = dirs::home_dir()
        .ok_or_else(|| ApiError::Config("Could not find home directory".to_string()))?;
    Ok(home.join(".tenant-dashboard"))
}

/// Get the canonical config file path (~/.tenant-dashboard/config.json)
pub fn config_path() -> Result<PathBuf, ApiError> {
    Ok(state_dir()?.join("config.json"))
}

/// Load config from the canonical path, then apply the environment override.
pub fn load_config() -> Result<ClientConfig, ApiError> {
    let mut config = load_config_from(&config_path()?)?;
    if let Ok(url) = std::env::var(API_URL_ENV) {
        if !url.trim().is_empty() {
            log::info!("Config: apiUrl overridden by {}", API_URL_ENV);
            config.api_url = url.trim().to_string();
        }
    }
    Ok(config)
}

/// Load config from an explicit path. A missing file yields defaults.
pub fn load_config_from(path: &std::path::Path) -> Result<ClientConfig, ApiError> {
    if !path.exists() {
        log::debug!("Config: {} not found, using defaults", path.display());
        return Ok(ClientConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ApiError::Config(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| ApiError::Config(format!("{}: {}", path.display(), e)))
}
