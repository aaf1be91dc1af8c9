use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub business: BusinessProfile,
    #[serde(default)]
    pub services: Vec<ServiceOffering>,
    #[serde(default)]
    pub pricing: Pricing,
    #[serde(default)]
    pub qualification: Qualification,
    #[serde(default)]
    pub booking: Booking,
    #[serde(default)]
    pub integrations: Integrations,
    #[serde(default)]
    pub appearance: Appearance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusinessProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceOffering {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_display: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pricing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Free-shape rate card, echoed into the instruction document as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_rates: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type_ranges: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Qualification {
    /// Flat minimum, used only when `minimum_budgets` is absent or empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_budget: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_budgets: Option<IndexMap<String, u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_areas: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advance_booking_days: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Booking {
    /// "auto_book" or "manual". Anything else falls back to manual.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_days: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_hours: Option<AvailableHours>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableHours {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Integrations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack: Option<SlackIntegration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramIntegration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackIntegration {
    pub webhook_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramIntegration {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Appearance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,
}

impl AgentConfig {
    pub fn from_value(value: Value) -> crate::Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| crate::ConciergeError::Serialization(e.to_string()))
    }

    pub fn booking_mode(&self) -> &str {
        match self.booking.mode.as_deref() {
            Some("auto_book") => "auto_book",
            _ => "manual",
        }
    }
}

/// Objects merge key by key; everything else (arrays included) is replaced.
pub fn deep_merge(base: &mut Value, update: &Value) {
    match (base, update) {
        (Value::Object(base_map), Value::Object(update_map)) => {
            for (key, update_value) in update_map {
                match base_map.get_mut(key) {
                    Some(base_value) if base_value.is_object() && update_value.is_object() => {
                        deep_merge(base_value, update_value);
                    }
                    _ => {
                        base_map.insert(key.clone(), update_value.clone());
                    }
                }
            }
        }
        (base_slot, update_value) => {
            *base_slot = update_value.clone();
        }
    }
}
