//! Tenant record and per-field profile autosave.

use serde::{Deserialize, Serialize};

use super::{segment, DataEnvelope};
use crate::autosave::FieldAutosave;
use crate::client::ApiClient;
use crate::config::ClientConfig;
use crate::error::ApiError;

/// Approved tenant business as returned by `GET /api/tenants/{slug}`.
///
/// Only the fields the dashboard edits are typed; everything else is kept
/// in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: serde_json::Value,
    pub slug: String,
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub business_phone: Option<String>,
    #[serde(default)]
    pub business_email: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub service_areas: serde_json::Value,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Tenant {
    /// String value of a top-level profile field, typed or not.
    pub fn field(&self, name: &str) -> Option<String> {
        let value = serde_json::to_value(self).ok()?;
        match value.get(name)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

pub async fn get_tenant(client: &ApiClient, slug: &str) -> Result<Tenant, ApiError> {
    let envelope: DataEnvelope<Tenant> = client
        .get(&format!("/api/tenants/{}", segment(slug)))
        .await?;
    envelope.into_data("tenant")
}

/// Persist a single profile field as `{ field: value }`.
pub async fn update_profile_field(
    client: &ApiClient,
    slug: &str,
    field: &str,
    value: serde_json::Value,
) -> Result<(), ApiError> {
    if field.trim().is_empty() {
        return Err(ApiError::Validation("profile field name is empty".to_string()));
    }
    let mut body = serde_json::Map::new();
    body.insert(field.to_string(), value);

    let _: serde_json::Value = client
        .put(
            &format!("/api/tenants/{}/profile", segment(slug)),
            &serde_json::Value::Object(body),
        )
        .await?;
    log::debug!("Tenants: updated {} for {}", field, slug);
    Ok(())
}

/// Debounced autosave for one text field of the business profile.
pub fn business_field_autosave(
    client: &ApiClient,
    config: &ClientConfig,
    slug: &str,
    field: &str,
    initial: String,
) -> FieldAutosave<String> {
    let client = client.clone();
    let slug = slug.to_string();
    let field_name = field.to_string();

    FieldAutosave::new(
        field,
        initial,
        config.autosave_debounce(),
        config.saved_indicator(),
        move |value: String| {
            let client = client.clone();
            let slug = slug.clone();
            let field_name = field_name.clone();
            async move {
                update_profile_field(&client, &slug, &field_name, serde_json::Value::String(value))
                    .await
            }
        },
    )
}
