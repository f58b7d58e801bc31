//! Multi-tier pricing for a service.
//!
//! `Service` and `Tier` are immutable values. Editing returns a new value,
//! so an editor can keep the previous one for undo or to discard changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Default duration for a freshly added tier.
pub const DEFAULT_TIER_DURATION: f64 = 60.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tier {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    price: f64,
    #[serde(default = "default_duration")]
    duration: f64,
    /// Feature ids included in this tier. The server calls these `features`.
    #[serde(default)]
    service_options: Vec<String>,
    /// Per-feature marketing copy keyed by feature id.
    #[serde(default)]
    tier_copies: BTreeMap<String, serde_json::Value>,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    popular: bool,
}

fn default_duration() -> f64 {
    DEFAULT_TIER_DURATION
}

fn default_enabled() -> bool {
    true
}

impl Tier {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: f64, duration: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            duration,
            service_options: Vec::new(),
            tier_copies: BTreeMap::new(),
            enabled: true,
            popular: false,
        }
    }

    /// Blank tier with a fresh `tier-…` id.
    pub fn new_default() -> Self {
        Self::new(
            format!("tier-{}", uuid::Uuid::new_v4().simple()),
            "",
            0.0,
            DEFAULT_TIER_DURATION,
        )
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, ApiError> {
        // Ids arrive as numbers from the database and as strings from drafts.
        let mut value = value.clone();
        if let Some(serde_json::Value::Number(n)) = value.get("id") {
            let id = n.to_string();
            value["id"] = serde_json::Value::String(id);
        }
        // Records may carry `features`, `serviceOptions` or both; `features` wins.
        if let Some(map) = value.as_object_mut() {
            if let Some(features) = map.remove("features") {
                if !features.is_null() {
                    map.insert("serviceOptions".to_string(), features);
                }
            }
        }
        serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("invalid tier: {}", e)))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn service_options(&self) -> &[String] {
        &self.service_options
    }

    pub fn tier_copy(&self, feature_id: &str) -> Option<&serde_json::Value> {
        self.tier_copies.get(feature_id)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn popular(&self) -> bool {
        self.popular
    }

    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn with_price(&self, price: f64) -> Self {
        Self {
            price,
            ..self.clone()
        }
    }

    pub fn with_duration(&self, duration: f64) -> Self {
        Self {
            duration,
            ..self.clone()
        }
    }

    pub fn with_enabled(&self, enabled: bool) -> Self {
        Self {
            enabled,
            ..self.clone()
        }
    }

    pub fn with_popular(&self, popular: bool) -> Self {
        Self {
            popular,
            ..self.clone()
        }
    }

    /// Add `feature_id` if absent, remove it if present.
    pub fn with_option_toggled(&self, feature_id: &str) -> Self {
        let mut next = self.clone();
        match next.service_options.iter().position(|o| o == feature_id) {
            Some(idx) => {
                next.service_options.remove(idx);
                next.tier_copies.remove(feature_id);
            }
            None => next.service_options.push(feature_id.to_string()),
        }
        next
    }

    pub fn with_tier_copy(&self, feature_id: &str, copy: serde_json::Value) -> Self {
        let mut next = self.clone();
        next.tier_copies.insert(feature_id.to_string(), copy);
        next
    }
}

/// A service with at least one tier. `id` is `None` until the server has
/// stored it.
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    id: Option<String>,
    name: String,
    tiers: Vec<Tier>,
}

impl Service {
    /// New unsaved service with one blank tier.
    pub fn draft(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            tiers: vec![Tier::new_default()],
        }
    }

    /// Build from a service record (`{ id?, name, tiers: [...] }`).
    ///
    /// A record without tiers gets one blank tier.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ApiError> {
        let id = match value.get("id") {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let name = value
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or_default()
            .to_string();
        let tiers = match value.get("tiers") {
            Some(serde_json::Value::Array(raw)) => raw
                .iter()
                .map(Tier::from_json)
                .collect::<Result<Vec<_>, _>>()?,
            Some(serde_json::Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(ApiError::InvalidResponse(format!(
                    "service tiers must be an array, got {}",
                    other
                )))
            }
        };

        Ok(Self {
            id,
            name,
            tiers: if tiers.is_empty() {
                vec![Tier::new_default()]
            } else {
                tiers
            },
        })
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn tier(&self, id: &str) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.id == id)
    }

    pub fn with_id(&self, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..self.clone()
        }
    }

    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn with_tier(&self, tier: Tier) -> Self {
        let mut tiers = self.tiers.clone();
        tiers.push(tier);
        Self {
            tiers,
            ..self.clone()
        }
    }

    /// Remove a tier. The last remaining tier cannot be removed.
    pub fn without_tier(&self, id: &str) -> Result<Self, ApiError> {
        if self.tier(id).is_none() {
            return Err(ApiError::Validation(format!("unknown tier {}", id)));
        }
        if self.tiers.len() == 1 {
            return Err(ApiError::Validation(
                "a service needs at least one tier".to_string(),
            ));
        }
        Ok(Self {
            tiers: self.tiers.iter().filter(|t| t.id != id).cloned().collect(),
            ..self.clone()
        })
    }

    /// Swap in `tier` for the tier with the same id.
    pub fn with_tier_replaced(&self, tier: Tier) -> Result<Self, ApiError> {
        let idx = self
            .tiers
            .iter()
            .position(|t| t.id == tier.id)
            .ok_or_else(|| ApiError::Validation(format!("unknown tier {}", tier.id)))?;
        let mut tiers = self.tiers.clone();
        tiers[idx] = tier;
        Ok(Self {
            tiers,
            ..self.clone()
        })
    }

    /// Body for create/update. Tiers with blank names are left out.
    pub fn submission_payload(&self) -> Result<ServicePayload, ApiError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ApiError::Validation("Service name is required".to_string()));
        }

        let tiers: Vec<TierPayload> = self
            .tiers
            .iter()
            .filter(|t| !t.name.trim().is_empty())
            .map(|t| TierPayload {
                id: t.id.clone(),
                name: t.name.clone(),
                price: t.price,
                duration: t.duration,
                features: t.service_options.clone(),
                enabled: t.enabled,
                popular: t.popular,
            })
            .collect();
        if tiers.is_empty() {
            return Err(ApiError::Validation(
                "Add at least one named tier".to_string(),
            ));
        }

        Ok(ServicePayload {
            name: name.to_string(),
            tiers,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierPayload {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub duration: f64,
    pub features: Vec<String>,
    pub enabled: bool,
    pub popular: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServicePayload {
    pub name: String,
    pub tiers: Vec<TierPayload>,
}
