//! Offline snapshot and page-render simulation over a fixture.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use forum_ads_common::engine::{Engine, EngineInit, HOOK_PARAM_AD_IDS, HOOK_PARAM_SLOT_CLASS};
use forum_ads_common::settings::Settings;
use forum_ads_common::slots::thread::{THREAD_INDEX_KEY, THREAD_SLOT_CLASS};
use forum_ads_common::slots::SlotStrategyRegistry;
use forum_ads_common::snapshot::{is_slot_class_active, refresh_active_ads, ActiveAdsSnapshot};
use forum_ads_common::visitor::Visitor;
use serde_json::json;

use crate::error::CliError;
use crate::fixture::{Fixture, FixtureServices};

/// Rebuilds the snapshot and slot classes from the fixture's store, the way
/// the host does after an admin saves a slot or ad.
pub fn publish(
    services: &FixtureServices,
    settings: &Settings,
) -> Result<ActiveAdsSnapshot, CliError> {
    refresh_active_ads(&services.services, &settings.engine)
        .map_err(|e| CliError::Fixture(format!("Failed to build snapshot: {e:?}")))
}

/// Rebuild the active-ads snapshot from the fixture and return it as JSON.
pub fn snapshot(fixture: &Fixture, settings: &Settings) -> Result<String, CliError> {
    let snapshot = publish(&fixture.services(), settings)?;
    Ok(serde_json::to_string_pretty(&snapshot)?)
}

/// Outcome of one simulated thread-list page.
#[derive(Debug)]
pub struct PageRender {
    /// `(thread index, ad id)` for every position that got an ad.
    pub placements: Vec<(usize, u32)>,
    pub html: String,
    pub views_logged: u64,
}

/// Walks `threads` positions of forum `forum_id` asking for a thread ad at
/// each, then renders the served ads through the template hook.
///
/// When the simple cache does not list the thread slot class as active, no
/// engine is built and the template comes back unchanged. An empty
/// `template` renders each ad with its own HTML.
pub fn render_thread_list(
    services: &FixtureServices,
    visitor: &Visitor,
    settings: &Settings,
    template: &str,
    forum_id: u32,
    threads: usize,
) -> PageRender {
    let unchanged = || PageRender {
        placements: Vec::new(),
        html: template.to_string(),
        views_logged: services.view_log.total_views(),
    };

    if !is_slot_class_active(
        services.services.simple_cache.as_ref(),
        &settings.engine.slot_classes_cache_key,
        THREAD_SLOT_CLASS,
    ) {
        log::info!("Slot class {THREAD_SLOT_CLASS} is not active, skipping engine");
        return unchanged();
    }

    let strategies = SlotStrategyRegistry::new(settings);
    let EngineInit { mut engine, source } =
        Engine::initialize(&services.services, settings, strategies, visitor.clone());
    log::info!("Engine initialized from {source:?}");

    let placements: Vec<(usize, u32)> = (0..threads)
        .filter_map(|index| {
            let args = [
                json!("thread_list_item"),
                json!({"node_id": forum_id}),
                json!({"thread_id": index + 1, THREAD_INDEX_KEY: index}),
            ];
            engine
                .ad_ids_should_be_served(THREAD_SLOT_CLASS, &args)
                .map(|ad_id| (index, ad_id))
        })
        .collect();

    if placements.is_empty() {
        return unchanged();
    }

    let ad_ids = placements
        .iter()
        .map(|(_, ad_id)| ad_id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let params = HashMap::from([
        (HOOK_PARAM_SLOT_CLASS.to_string(), THREAD_SLOT_CLASS.to_string()),
        (HOOK_PARAM_AD_IDS.to_string(), ad_ids),
    ]);

    let mut html = template.to_string();
    engine.on_template_hook(&settings.engine.hook_name, &mut html, &params);

    PageRender {
        placements,
        html,
        views_logged: services.view_log.total_views(),
    }
}

/// Reads the template file, if any.
pub fn load_template(file: Option<&Path>) -> Result<String, CliError> {
    match file {
        Some(file) => Ok(fs::read_to_string(file)?),
        None => Ok(String::new()),
    }
}
