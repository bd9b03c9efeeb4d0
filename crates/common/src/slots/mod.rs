//! Slot placement strategies and their registry.
//!
//! Each slot class is served by one [`SlotStrategy`]. Strategies are resolved
//! from their tag once, in [`SlotStrategyRegistry`]; the engine never looks a
//! tag up anywhere else.

use std::sync::Arc;

use error_stack::Report;
use serde_json::{json, Map, Value};

use crate::engine::Engine;
use crate::error::AdEngineError;
use crate::models::{Ad, AdConfigOptions, AdId, Slot};
use crate::settings::Settings;

mod registry;
pub mod render;
pub mod thread;

pub use registry::SlotStrategyRegistry;

/// Admin form template name plus the parameters it is rendered with.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionsTemplate {
    pub template_name: &'static str,
    pub params: Map<String, Value>,
}

/// Placement logic for one slot class.
///
/// Provided methods are the shared base behaviour. Strategies that override
/// one should call the matching function in [`base`] so the base checks still
/// run.
pub trait SlotStrategy: Send + Sync {
    /// Tag stored in [`Slot::slot_class`].
    fn slot_class(&self) -> &'static str;

    fn slot_options_template_name(&self) -> &'static str;

    fn ad_options_template_name(&self) -> &'static str;

    fn prepare_slot_options_template(&self, slot: &Slot) -> OptionsTemplate {
        base::prepare_slot_options_template(self, slot)
    }

    fn prepare_ad_options_template(&self, ad: &Ad, slot: &Slot) -> OptionsTemplate {
        base::prepare_ad_options_template(self, ad, slot)
    }

    /// Whether the admin may upload a file for `option_key`.
    fn allow_upload(&self, _slot: &Slot, _option_key: &str) -> bool {
        false
    }

    /// Validates admin-submitted ad options.
    ///
    /// # Errors
    ///
    /// Returns [`AdEngineError::InvalidAdOptions`] describing the first
    /// rejected option.
    fn verify_ad_options(
        &self,
        slot: &Slot,
        ad_options: &Map<String, Value>,
        config_options: &AdConfigOptions,
    ) -> Result<(), Report<AdEngineError>> {
        base::verify_ad_options(slot, ad_options, config_options)
    }

    /// Picks, marks served and returns the ad for a page position.
    ///
    /// `args` are the host's positional arguments; the first is the position
    /// tag. Returns `None` when the arguments are not understood or nothing
    /// matches.
    fn ad_ids_should_be_served(&self, engine: &mut Engine, args: &[Value]) -> Option<AdId>;

    /// Substitutes the ad's placeholders into `html`.
    fn render_ad_html(&self, ad: &Ad, slot: &Slot, html: &str) -> String;

    /// Renders an ad served earlier in this request.
    ///
    /// Uses `html` as the template, or the ad's own HTML when `html` is blank.
    /// Ads not served by `engine` render as an empty string.
    fn prepare_ad_html(&self, engine: &Engine, ad_id: AdId, html: &str) -> String {
        base::prepare_ad_html(self, engine, ad_id, html)
    }
}

/// Base behaviour shared by every strategy.
pub mod base {
    use super::{json, AdConfigOptions, AdEngineError, Engine, Map, OptionsTemplate, Report};
    use super::{Ad, AdId, Slot, SlotStrategy, Value};

    pub fn prepare_slot_options_template<S: SlotStrategy + ?Sized>(
        strategy: &S,
        slot: &Slot,
    ) -> OptionsTemplate {
        let mut params = Map::new();
        params.insert("slotClass".to_string(), json!(strategy.slot_class()));
        params.insert("slot".to_string(), json!(slot));
        OptionsTemplate {
            template_name: strategy.slot_options_template_name(),
            params,
        }
    }

    pub fn prepare_ad_options_template<S: SlotStrategy + ?Sized>(
        strategy: &S,
        ad: &Ad,
        slot: &Slot,
    ) -> OptionsTemplate {
        let mut params = Map::new();
        params.insert("slotClass".to_string(), json!(strategy.slot_class()));
        params.insert("slot".to_string(), json!(slot));
        params.insert("ad".to_string(), json!(ad));
        OptionsTemplate {
            template_name: strategy.ad_options_template_name(),
            params,
        }
    }

    /// Rejects targeting criteria the engine could never satisfy.
    ///
    /// # Errors
    ///
    /// Returns [`AdEngineError::InvalidAdOptions`] naming the unrecognized
    /// criteria rules.
    pub fn verify_ad_options(
        _slot: &Slot,
        _ad_options: &Map<String, Value>,
        config_options: &AdConfigOptions,
    ) -> Result<(), Report<AdEngineError>> {
        let Some(criteria) = &config_options.user_criteria else {
            return Ok(());
        };
        let unrecognized = criteria.unrecognized_rules();
        if unrecognized.is_empty() {
            return Ok(());
        }
        Err(Report::new(AdEngineError::InvalidAdOptions {
            message: format!("unrecognized user criteria: {}", unrecognized.join(", ")),
        }))
    }

    pub fn prepare_ad_html<S: SlotStrategy + ?Sized>(
        strategy: &S,
        engine: &Engine,
        ad_id: AdId,
        html: &str,
    ) -> String {
        let (Some(slot), Some(ad)) = engine.served_slot_and_ad(ad_id) else {
            log::debug!("Ad {ad_id} was not served in this request, nothing to render");
            return String::new();
        };

        let template = if html.trim().is_empty() {
            ad.ad_html.as_str()
        } else {
            html
        };
        strategy.render_ad_html(ad, slot, template)
    }
}

type StrategyBuilder = fn(&Settings) -> Arc<dyn SlotStrategy>;

pub(crate) fn builders() -> &'static [StrategyBuilder] {
    &[thread::register]
}
