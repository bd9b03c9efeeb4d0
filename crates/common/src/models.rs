//! Slot and ad records as stored by the host and cached in the snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::criteria::UserCriteria;

pub type SlotId = u32;
pub type AdId = u32;

/// An admin-configured ad placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub slot_id: SlotId,
    /// Tag of the placement strategy that governs this slot.
    pub slot_class: String,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Placement parameters, e.g. `forumIds`, `threadIndex`, `sponsoredText`.
    #[serde(default)]
    pub slot_options: Map<String, Value>,
}

impl Slot {
    /// Reads an integer slot option, accepting numbers and numeric strings.
    ///
    /// Anything else (missing, non-numeric) falls back to `default`.
    #[must_use]
    pub fn int_option(&self, key: &str, default: i64) -> i64 {
        self.slot_options
            .get(key)
            .and_then(coerce_int)
            .unwrap_or(default)
    }

    /// Non-empty string option.
    #[must_use]
    pub fn str_option(&self, key: &str) -> Option<&str> {
        self.slot_options
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Integer list option; non-integer entries are skipped.
    #[must_use]
    pub fn id_list_option(&self, key: &str) -> Vec<i64> {
        match self.slot_options.get(key) {
            Some(Value::Array(items)) => items.iter().filter_map(coerce_int).collect(),
            Some(other) => coerce_int(other).into_iter().collect(),
            None => Vec::new(),
        }
    }
}

/// Options set by the admin when configuring an ad.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdConfigOptions {
    /// Targeting rules; `None` or empty means every visitor is eligible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_criteria: Option<UserCriteria>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A creative belonging to exactly one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ad {
    pub ad_id: AdId,
    pub slot_id: SlotId,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub ad_config_options: AdConfigOptions,
    /// Strategy-specific ad options, e.g. the outbound `link`.
    #[serde(default)]
    pub ad_options: Map<String, Value>,
    /// Localized copy keyed by phrase name (`title`, `description`).
    #[serde(default)]
    pub phrases: BTreeMap<String, String>,
    /// Public URLs of uploaded media keyed by option (e.g. `avatar`).
    #[serde(default)]
    pub upload_urls: BTreeMap<String, String>,
    /// HTML with `{placeholder}` tokens.
    #[serde(default)]
    pub ad_html: String,
}

impl Ad {
    #[must_use]
    pub fn phrase(&self, name: &str) -> &str {
        self.phrases.get(name).map_or("", String::as_str)
    }

    #[must_use]
    pub fn link(&self) -> &str {
        self.ad_options
            .get("link")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    #[must_use]
    pub fn upload_url(&self, option_key: &str) -> Option<&str> {
        self.upload_urls
            .get(option_key)
            .map(String::as_str)
            .filter(|url| !url.is_empty())
    }
}

fn default_active() -> bool {
    true
}

/// Integer coercion for loosely typed host values.
///
/// Integers pass through, floats truncate, strings parse after trimming.
#[must_use]
pub fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}
