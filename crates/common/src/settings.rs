use config::{Config, Environment, File, FileFormat};
use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AdEngineError;

pub const ENVIRONMENT_VARIABLE_PREFIX: &str = "FORUM_ADS";
pub const ENVIRONMENT_VARIABLE_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct EngineSettings {
    /// Data registry key holding the active-ads snapshot.
    #[serde(default = "default_registry_key")]
    #[validate(length(min = 1))]
    pub registry_key: String,
    /// Simple cache key holding the active slot classes.
    #[serde(default = "default_slot_classes_cache_key")]
    #[validate(length(min = 1))]
    pub slot_classes_cache_key: String,
    /// Name of the template hook the engine renders into.
    #[serde(default = "default_hook_name")]
    #[validate(length(min = 1))]
    pub hook_name: String,
    #[serde(default = "default_exempt_permission_group")]
    #[validate(length(min = 1))]
    pub exempt_permission_group: String,
    /// Visitors holding this permission are never shown ads.
    #[serde(default = "default_exempt_permission")]
    #[validate(length(min = 1))]
    pub exempt_permission: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            registry_key: default_registry_key(),
            slot_classes_cache_key: default_slot_classes_cache_key(),
            hook_name: default_hook_name(),
            exempt_permission_group: default_exempt_permission_group(),
            exempt_permission: default_exempt_permission(),
        }
    }
}

fn default_registry_key() -> String {
    "activeAds".to_string()
}

fn default_slot_classes_cache_key() -> String {
    "activeSlotClasses".to_string()
}

fn default_hook_name() -> String {
    "ad_hook".to_string()
}

fn default_exempt_permission_group() -> String {
    "general".to_string()
}

fn default_exempt_permission() -> String {
    "noAds".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RenderSettings {
    /// Disclosure text used when a slot has no `sponsoredText` override.
    #[serde(default = "default_sponsored_text")]
    #[validate(length(min = 1))]
    pub sponsored_text: String,
    /// Avatar shown for ads without an uploaded avatar.
    #[serde(default = "default_avatar_url")]
    #[validate(length(min = 1))]
    pub default_avatar_url: String,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            sponsored_text: default_sponsored_text(),
            default_avatar_url: default_avatar_url(),
        }
    }
}

fn default_sponsored_text() -> String {
    "Sponsored".to_string()
}

fn default_avatar_url() -> String {
    "styles/default/avatars/avatar_s.png".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct Settings {
    #[serde(default)]
    #[validate(nested)]
    pub engine: EngineSettings,
    #[serde(default)]
    #[validate(nested)]
    pub render: RenderSettings,
}

impl Settings {
    /// Builds settings from a TOML document merged with `FORUM_ADS__*`
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`AdEngineError::Configuration`] when the TOML cannot be parsed,
    /// a value has the wrong type, or validation fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, Report<AdEngineError>> {
        let environment = Environment::default()
            .prefix(ENVIRONMENT_VARIABLE_PREFIX)
            .separator(ENVIRONMENT_VARIABLE_SEPARATOR);

        let toml = File::from_str(toml_str, FileFormat::Toml);
        let config = Config::builder()
            .add_source(toml)
            .add_source(environment)
            .build()
            .change_context(AdEngineError::Configuration {
                message: "Failed to build configuration".to_string(),
            })?;

        let settings: Self =
            config
                .try_deserialize()
                .change_context(AdEngineError::Configuration {
                    message: "Failed to deserialize configuration".to_string(),
                })?;

        settings.validate().map_err(|err| {
            Report::new(AdEngineError::Configuration {
                message: format!("Settings validation failed: {err}"),
            })
        })?;

        Ok(settings)
    }

    /// Serializes the merged settings back to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`AdEngineError::Serialization`] if the settings cannot be
    /// rendered as TOML.
    pub fn to_toml(&self) -> Result<String, Report<AdEngineError>> {
        toml::to_string_pretty(self).change_context(AdEngineError::Serialization {
            message: "Failed to serialize settings to TOML".to_string(),
        })
    }
}
