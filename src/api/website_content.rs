//! Website copy shown on the tenant's public site.

use serde::{Deserialize, Serialize};

use super::segment;
use crate::client::ApiClient;
use crate::error::ApiError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaqItem {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Editable website content. Missing fields deserialize to empty values,
/// matching what the server returns for a tenant with no saved content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebsiteContent {
    pub hero_title: String,
    pub hero_subtitle: String,
    pub services_title: String,
    pub services_subtitle: String,
    pub services_auto_description: String,
    pub services_marine_description: String,
    pub services_rv_description: String,
    pub services_ceramic_description: String,
    pub services_correction_description: String,
    pub services_ppf_description: String,
    pub reviews_title: String,
    pub reviews_subtitle: String,
    pub reviews_avg_rating: f64,
    pub reviews_total_count: u64,
    pub faq_title: String,
    pub faq_subtitle: String,
    pub faq_items: Vec<FaqItem>,
}

#[derive(Debug, Deserialize)]
struct ContentEnvelope {
    content: Option<WebsiteContent>,
}

fn content_path(slug: &str) -> String {
    format!("/api/website-content/{}", segment(slug))
}

pub async fn get_website_content(client: &ApiClient, slug: &str) -> Result<WebsiteContent, ApiError> {
    let envelope: ContentEnvelope = client.get(&content_path(slug)).await?;
    Ok(envelope.content.unwrap_or_default())
}

/// Save the whole content record; returns what the server stored.
pub async fn save_website_content(
    client: &ApiClient,
    slug: &str,
    content: &WebsiteContent,
) -> Result<WebsiteContent, ApiError> {
    let envelope: ContentEnvelope = client.put(&content_path(slug), content).await?;
    Ok(envelope.content.unwrap_or_else(|| content.clone()))
}
