//! Per-request ad selection and serving state.
//!
//! An [`Engine`] lives for exactly one request. It is produced by
//! [`Engine::initialize`], which loads the active-ads snapshot from the data
//! registry (rebuilding it inline when needed), and is dropped with the
//! request. Serving an ad moves its slot and the ad itself out of the
//! candidate pool, so nothing is shown twice on one page.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::models::{Ad, AdId, Slot, SlotId};
use crate::settings::{EngineSettings, Settings};
use crate::served::ServedState;
use crate::slots::SlotStrategyRegistry;
use crate::snapshot::{
    refresh_active_ads, ActiveAdsSnapshot, ActiveSlotClasses, SnapshotStatus,
};
use crate::store::{HostServices, ViewLogger};
use crate::visitor::Visitor;

pub const HOOK_PARAM_SLOT_CLASS: &str = "slotClass";
pub const HOOK_PARAM_AD_IDS: &str = "adIds";

/// Where the engine's data came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotSource {
    /// The visitor is exempt from ads; the engine is empty.
    Exempt,
    /// A current snapshot was read from the registry.
    Cached,
    /// The registry copy was rejected and rebuilt from the store.
    Rebuilt(SnapshotStatus),
    /// Neither the registry nor the store could provide data.
    Unavailable,
}

/// Result of [`Engine::initialize`].
#[derive(Debug)]
pub struct EngineInit {
    pub engine: Engine,
    pub source: SnapshotSource,
}

pub struct Engine {
    settings: EngineSettings,
    strategies: SlotStrategyRegistry,
    view_logger: Arc<dyn ViewLogger>,
    visitor: Visitor,
    state: ServedState,
    active_slot_classes: ActiveSlotClasses,
    ad_has_been_served: bool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("strategies", &self.strategies)
            .field("state", &self.state)
            .field("active_slot_classes", &self.active_slot_classes)
            .field("ad_has_been_served", &self.ad_has_been_served)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Builds the engine for one request.
    ///
    /// Exempt visitors get an empty engine without touching the registry.
    /// Otherwise the cached snapshot is used when current; a missing,
    /// malformed or stale one is rebuilt synchronously first. A store failure
    /// during the rebuild is logged and leaves the engine empty.
    #[must_use]
    pub fn initialize(
        services: &HostServices,
        settings: &Settings,
        strategies: SlotStrategyRegistry,
        visitor: Visitor,
    ) -> EngineInit {
        let engine_settings = &settings.engine;

        if visitor.has_permission(
            &engine_settings.exempt_permission_group,
            &engine_settings.exempt_permission,
        ) {
            log::debug!("Visitor {} is exempt from ads", visitor.user_id);
            return EngineInit {
                engine: Self::new(
                    ActiveAdsSnapshot::default(),
                    engine_settings.clone(),
                    strategies,
                    services.view_logger.clone(),
                    visitor,
                ),
                source: SnapshotSource::Exempt,
            };
        }

        let cached = services
            .registry
            .get(&engine_settings.registry_key)
            .unwrap_or_else(|report| {
                log::warn!("Failed to read active-ads snapshot: {report:?}");
                None
            });

        let (snapshot, source) = match ActiveAdsSnapshot::from_cached(cached) {
            (Some(snapshot), _) => (snapshot, SnapshotSource::Cached),
            (None, status) => {
                log::info!("Active-ads snapshot unusable ({status:?}), rebuilding");
                match refresh_active_ads(services, engine_settings) {
                    Ok(snapshot) => (snapshot, SnapshotSource::Rebuilt(status)),
                    Err(report) => {
                        log::error!("Failed to rebuild active-ads snapshot: {report:?}");
                        (ActiveAdsSnapshot::default(), SnapshotSource::Unavailable)
                    }
                }
            }
        };

        EngineInit {
            engine: Self::new(
                snapshot,
                engine_settings.clone(),
                strategies,
                services.view_logger.clone(),
                visitor,
            ),
            source,
        }
    }

    #[must_use]
    pub fn new(
        snapshot: ActiveAdsSnapshot,
        settings: EngineSettings,
        strategies: SlotStrategyRegistry,
        view_logger: Arc<dyn ViewLogger>,
        visitor: Visitor,
    ) -> Self {
        let mut engine = Self {
            settings,
            strategies,
            view_logger,
            visitor,
            state: ServedState::from_snapshot(snapshot),
            active_slot_classes: ActiveSlotClasses::default(),
            ad_has_been_served: false,
        };
        engine.update_active_slot_classes();
        engine
    }

    /// Whether any not-yet-served slot has class `slot_class`.
    #[must_use]
    pub fn is_slot_class_active(&self, slot_class: &str) -> bool {
        self.active_slot_classes.contains(slot_class)
    }

    #[must_use]
    pub fn active_slot_classes(&self) -> &ActiveSlotClasses {
        &self.active_slot_classes
    }

    #[must_use]
    pub fn visitor(&self) -> &Visitor {
        &self.visitor
    }

    /// True once any ad has been marked served in this request.
    #[must_use]
    pub fn ad_has_been_served(&self) -> bool {
        self.ad_has_been_served
    }

    /// Asks the strategy for `slot_class` to pick an ad for a page position.
    ///
    /// `args` are passed through to the strategy untouched. Returns `None`
    /// without consulting the strategy when the class has no available slot.
    pub fn ad_ids_should_be_served(
        &mut self,
        slot_class: &str,
        args: &[serde_json::Value],
    ) -> Option<AdId> {
        if !self.is_slot_class_active(slot_class) {
            return None;
        }

        let strategy = self.strategies.get(slot_class)?;
        strategy.ad_ids_should_be_served(self, args)
    }

    /// Renders served ads into a template hook's buffer.
    ///
    /// Only the configured hook name is handled, and only when both
    /// `slotClass` and `adIds` are given. `adIds` is split on commas; each
    /// entry is coerced to an integer and kept if strictly positive. On
    /// success `contents` is replaced by the concatenated ad HTML, using the
    /// original contents as the template.
    pub fn on_template_hook(
        &self,
        hook_name: &str,
        contents: &mut String,
        params: &HashMap<String, String>,
    ) {
        if hook_name != self.settings.hook_name {
            return;
        }
        let (Some(slot_class), Some(ad_ids)) = (
            params.get(HOOK_PARAM_SLOT_CLASS),
            params.get(HOOK_PARAM_AD_IDS),
        ) else {
            return;
        };
        let Some(strategy) = self.strategies.get(slot_class) else {
            log::warn!("Template hook requested unknown slot class '{slot_class}'");
            return;
        };

        let template = contents.as_str();
        let rendered: String = parse_ad_ids(ad_ids)
            .into_iter()
            .map(|ad_id| strategy.prepare_ad_html(self, ad_id, template))
            .collect();
        *contents = rendered;
    }

    /// Available slots of `slot_class`.
    #[must_use]
    pub fn slots_by_class(&self, slot_class: &str) -> BTreeMap<SlotId, &Slot> {
        self.state
            .available_slots()
            .filter(|slot| slot.slot_class == slot_class)
            .map(|slot| (slot.slot_id, slot))
            .collect()
    }

    /// Available ads of `slot_id`; empty when the slot has none.
    #[must_use]
    pub fn ads_by_slot_id(&self, slot_id: SlotId) -> BTreeMap<AdId, &Ad> {
        self.state
            .available_ads(slot_id)
            .map(|ads| ads.iter().map(|(id, ad)| (*id, ad)).collect())
            .unwrap_or_default()
    }

    /// A random available ad of `slot_id` whose criteria match the visitor.
    #[must_use]
    pub fn random_ad_by_slot_id(&self, slot_id: SlotId) -> Option<&Ad> {
        self.random_ad_by_slot_id_with(slot_id, &mut rand::thread_rng())
    }

    /// Like [`Engine::random_ad_by_slot_id`] with a caller-supplied RNG.
    ///
    /// All candidates are shuffled, then tried in order until one passes its
    /// user criteria.
    pub fn random_ad_by_slot_id_with<R: Rng + ?Sized>(
        &self,
        slot_id: SlotId,
        rng: &mut R,
    ) -> Option<&Ad> {
        let ads = self.state.available_ads(slot_id)?;
        let mut candidates: Vec<&Ad> = ads.values().collect();
        candidates.shuffle(rng);

        let now = Utc::now();
        candidates.into_iter().find(|ad| {
            match &ad.ad_config_options.user_criteria {
                Some(criteria) if !criteria.is_empty() => criteria.matches(&self.visitor, now),
                _ => true,
            }
        })
    }

    /// Marks `slot_id` and `ad_id` as served.
    ///
    /// Logs a view only when the ad was still available. The slot's class
    /// stops counting as active once no available slot of that class remains.
    /// Repeating the call for an already served pair changes nothing.
    pub fn mark_served(&mut self, slot_id: SlotId, ad_id: AdId) {
        let outcome = self.state.mark(slot_id, ad_id);

        if outcome.ad_moved {
            self.view_logger.log_ad_view(ad_id);
        }
        log::debug!(
            "Marked slot {slot_id} / ad {ad_id} served (slot moved: {}, ad moved: {})",
            outcome.slot_moved,
            outcome.ad_moved
        );

        self.update_active_slot_classes();
        self.ad_has_been_served = true;
    }

    /// The served ad with id `ad_id` and the slot it was served in.
    #[must_use]
    pub fn served_slot_and_ad(&self, ad_id: AdId) -> (Option<&Slot>, Option<&Ad>) {
        let Some(ad) = self.state.served_ad(ad_id) else {
            return (None, None);
        };
        (self.state.served_slot(ad.slot_id), Some(ad))
    }

    /// Ids of the ads served so far. Callers must not rely on the order.
    #[must_use]
    pub fn served_ad_ids(&self) -> Vec<AdId> {
        self.state.served_ad_ids().collect()
    }

    fn update_active_slot_classes(&mut self) {
        self.active_slot_classes = ActiveSlotClasses::from_slots(self.state.available_slots());
    }
}

/// Parses a comma-separated id list, keeping strictly positive ids.
///
/// Each entry is coerced by its leading integer: `" 9"` is 9, `"5px"` is 5,
/// `"abc"` is 0 and dropped. Digit runs beyond the `i64` range saturate, and
/// anything above the id range is dropped too.
#[must_use]
pub fn parse_ad_ids(raw: &str) -> Vec<AdId> {
    raw.split(',')
        .map(leading_int)
        .filter(|id| *id > 0)
        .filter_map(|id| AdId::try_from(id).ok())
        .collect()
}

fn leading_int(raw: &str) -> i64 {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let digits = &digits[..end];
    if digits.is_empty() {
        return 0;
    }
    match digits.parse::<i64>() {
        Ok(value) if negative => -value,
        Ok(value) => value,
        Err(_) if negative => i64::MIN,
        Err(_) => i64::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::thread::THREAD_SLOT_CLASS;
    use crate::snapshot::ENGINE_VERSION;
    use crate::store::DataRegistry;
    use crate::test_support::tests::{
        ad, ad_with_criteria, create_test_services, create_test_settings, slot, TestServices,
        TEST_AD_HTML,
    };
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::{json, Value};

    fn start(fixture: &TestServices, visitor: Visitor) -> EngineInit {
        let settings = create_test_settings();
        let strategies = SlotStrategyRegistry::new(&settings);
        Engine::initialize(&fixture.services, &settings, strategies, visitor)
    }

    fn thread_args(forum_id: i64, index: i64) -> Vec<Value> {
        vec![
            json!("thread_list_item"),
            json!({"node_id": forum_id, "title": "General"}),
            json!({"thread_id": 100 + index, "index_in_threads": index}),
        ]
    }

    fn hook_params(slot_class: &str, ad_ids: &str) -> HashMap<String, String> {
        HashMap::from([
            (HOOK_PARAM_SLOT_CLASS.to_string(), slot_class.to_string()),
            (HOOK_PARAM_AD_IDS.to_string(), ad_ids.to_string()),
        ])
    }

    fn two_slot_fixture() -> TestServices {
        create_test_services(
            vec![
                slot(1, THREAD_SLOT_CLASS, json!({"forumIds": [3], "threadIndex": 0})),
                slot(2, THREAD_SLOT_CLASS, json!({"forumIds": [3], "threadIndex": 4})),
            ],
            vec![ad(5, 1), ad(7, 2)],
        )
    }

    #[test]
    fn test_parse_ad_ids() {
        assert_eq!(parse_ad_ids("5,-1,abc,9"), vec![5, 9]);
        assert_eq!(parse_ad_ids(" 3, 4px,+6,0"), vec![3, 4, 6]);
        assert_eq!(parse_ad_ids(""), Vec::<AdId>::new());
        assert_eq!(parse_ad_ids("99999999999"), Vec::<AdId>::new());
    }

    #[test]
    fn test_leading_int_saturates() {
        assert_eq!(leading_int("99999999999999999999999"), i64::MAX);
        assert_eq!(leading_int("-99999999999999999999999"), i64::MIN);
        assert_eq!(leading_int("-"), 0);
        assert_eq!(
            parse_ad_ids("4,99999999999999999999999,-99999999999999999999999"),
            vec![4]
        );
    }

    #[test]
    fn test_initialize_rebuilds_missing_snapshot_once() {
        let fixture = two_slot_fixture();
        let settings = create_test_settings();

        let init = start(&fixture, Visitor::guest());
        assert_eq!(init.source, SnapshotSource::Rebuilt(SnapshotStatus::Missing));
        assert_eq!(fixture.registry.write_count(&settings.engine.registry_key), 1);

        let again = start(&fixture, Visitor::guest());
        assert_eq!(again.source, SnapshotSource::Cached);
        assert_eq!(fixture.registry.write_count(&settings.engine.registry_key), 1);
    }

    #[test]
    fn test_initialize_rebuilds_stale_and_malformed_snapshots() {
        let settings = create_test_settings();
        let key = settings.engine.registry_key.clone();
        let stale = json!({"version": ENGINE_VERSION - 1, "slots": {}, "adsGrouped": {}});

        for (cached, expected) in [
            (stale, SnapshotStatus::Stale { version: ENGINE_VERSION - 1 }),
            (json!([1, 2, 3]), SnapshotStatus::Malformed),
            (json!({"slots": {}, "adsGrouped": {}}), SnapshotStatus::Malformed),
        ] {
            let fixture = two_slot_fixture();
            fixture.registry.set(&key, cached).expect("seed registry");

            let init = start(&fixture, Visitor::guest());
            assert_eq!(init.source, SnapshotSource::Rebuilt(expected));
            assert_eq!(fixture.registry.write_count(&key), 2);

            let fresh = refresh_active_ads(&fixture.services, &settings.engine).expect("refresh");
            let engine = init.engine;
            assert_eq!(
                engine.slots_by_class(THREAD_SLOT_CLASS).len(),
                fresh.slots.len()
            );
            assert_eq!(engine.ads_by_slot_id(1).len(), fresh.ads_grouped[&1].len());
        }
    }

    struct FailingStore;

    impl crate::store::AdStore for FailingStore {
        fn slots(
            &self,
            _filter: crate::store::RecordFilter,
        ) -> Result<BTreeMap<SlotId, Slot>, error_stack::Report<crate::error::AdEngineError>>
        {
            Err(error_stack::Report::new(crate::error::AdEngineError::Store {
                message: "database offline".to_string(),
            }))
        }

        fn ads(
            &self,
            _filter: crate::store::RecordFilter,
        ) -> Result<BTreeMap<AdId, Ad>, error_stack::Report<crate::error::AdEngineError>> {
            Ok(BTreeMap::new())
        }
    }

    #[test]
    fn test_store_failure_leaves_engine_empty() {
        let mut fixture = two_slot_fixture();
        fixture.services.store = Arc::new(FailingStore);

        let EngineInit { mut engine, source } = start(&fixture, Visitor::guest());

        assert_eq!(source, SnapshotSource::Unavailable);
        assert!(engine.active_slot_classes().is_empty());
        assert_eq!(engine.ad_ids_should_be_served(THREAD_SLOT_CLASS, &thread_args(3, 0)), None);
        assert_eq!(fixture.registry.write_count(&create_test_settings().engine.registry_key), 0);
    }

    struct ReadOnlyRegistry;

    impl DataRegistry for ReadOnlyRegistry {
        fn get(
            &self,
            _key: &str,
        ) -> Result<Option<Value>, error_stack::Report<crate::error::AdEngineError>> {
            Ok(None)
        }

        fn set(
            &self,
            key: &str,
            _value: Value,
        ) -> Result<(), error_stack::Report<crate::error::AdEngineError>> {
            Err(error_stack::Report::new(crate::error::AdEngineError::Registry {
                message: format!("'{key}' is read-only"),
            }))
        }
    }

    #[test]
    fn test_registry_write_failure_still_serves() {
        let mut fixture = two_slot_fixture();
        fixture.services.registry = Arc::new(ReadOnlyRegistry);

        let EngineInit { mut engine, source } = start(&fixture, Visitor::guest());

        assert_eq!(source, SnapshotSource::Rebuilt(SnapshotStatus::Missing));
        assert_eq!(
            engine.ad_ids_should_be_served(THREAD_SLOT_CLASS, &thread_args(3, 0)),
            Some(5)
        );
    }

    #[test]
    fn test_exempt_visitor_gets_empty_engine() {
        let fixture = two_slot_fixture();
        let visitor = Visitor::guest().with_permission("general", "noAds");

        let EngineInit { mut engine, source } = start(&fixture, visitor);

        assert_eq!(source, SnapshotSource::Exempt);
        assert!(!engine.is_slot_class_active(THREAD_SLOT_CLASS));
        assert!(engine.active_slot_classes().is_empty());
        assert!(engine.slots_by_class(THREAD_SLOT_CLASS).is_empty());
        assert_eq!(engine.ad_ids_should_be_served(THREAD_SLOT_CLASS, &thread_args(3, 0)), None);
        assert!(engine.served_ad_ids().is_empty());
        assert_eq!(fixture.view_log.total_views(), 0);
    }

    #[test]
    fn test_slot_class_membership_is_exact() {
        let fixture = two_slot_fixture();
        let engine = start(&fixture, Visitor::guest()).engine;

        assert!(engine.is_slot_class_active(THREAD_SLOT_CLASS));
        assert!(!engine.is_slot_class_active("thread"));
        assert!(!engine.is_slot_class_active("Sidebar"));
    }

    #[test]
    fn test_mark_served_is_idempotent() {
        let fixture = two_slot_fixture();
        let mut engine = start(&fixture, Visitor::guest()).engine;

        engine.mark_served(1, 5);
        engine.mark_served(1, 5);

        assert_eq!(fixture.view_log.view_count(5), 1);
        assert_eq!(engine.served_ad_ids(), vec![5]);
        assert!(engine.ad_has_been_served());
    }

    #[test]
    fn test_mark_served_unknown_ids_still_flags_request() {
        let fixture = two_slot_fixture();
        let mut engine = start(&fixture, Visitor::guest()).engine;

        engine.mark_served(42, 420);

        assert!(engine.ad_has_been_served());
        assert!(engine.served_ad_ids().is_empty());
        assert_eq!(fixture.view_log.total_views(), 0);
        assert_eq!(engine.slots_by_class(THREAD_SLOT_CLASS).len(), 2);
    }

    #[test]
    fn test_served_entries_leave_lookups() {
        let fixture = create_test_services(
            vec![slot(1, THREAD_SLOT_CLASS, json!({"forumIds": [3]}))],
            vec![ad(5, 1), ad(6, 1)],
        );
        let mut engine = start(&fixture, Visitor::guest()).engine;

        engine.mark_served(1, 5);

        assert!(engine.slots_by_class(THREAD_SLOT_CLASS).is_empty());
        assert_eq!(engine.ads_by_slot_id(1).keys().copied().collect::<Vec<_>>(), vec![6]);
        assert!(!engine.is_slot_class_active(THREAD_SLOT_CLASS));
        assert!(engine.ads_by_slot_id(99).is_empty());
    }

    #[test]
    fn test_served_slot_and_ad_lookup() {
        let fixture = two_slot_fixture();
        let mut engine = start(&fixture, Visitor::guest()).engine;

        assert_eq!(engine.served_slot_and_ad(5), (None, None));

        engine.mark_served(1, 5);
        let (slot, ad) = engine.served_slot_and_ad(5);
        assert_eq!(slot.map(|s| s.slot_id), Some(1));
        assert_eq!(ad.map(|a| a.ad_id), Some(5));
    }

    #[test]
    fn test_random_ad_respects_criteria() {
        let guests_only = json!([{"rule": "is_guest"}]);
        let members_only = json!([{"rule": "is_logged_in"}]);
        let fixture = create_test_services(
            vec![slot(1, THREAD_SLOT_CLASS, json!({}))],
            vec![
                ad_with_criteria(5, 1, guests_only),
                ad_with_criteria(6, 1, members_only.clone()),
                ad(7, 1),
            ],
        );
        let engine = start(&fixture, Visitor::guest()).engine;

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let picked = engine
                .random_ad_by_slot_id_with(1, &mut rng)
                .expect("eligible ad");
            assert_ne!(picked.ad_id, 6);
        }

        let only_members = create_test_services(
            vec![slot(1, THREAD_SLOT_CLASS, json!({}))],
            vec![ad_with_criteria(6, 1, members_only)],
        );
        let engine = start(&only_members, Visitor::guest()).engine;
        assert!(engine.random_ad_by_slot_id(1).is_none());
        assert!(engine.random_ad_by_slot_id(2).is_none());
    }

    #[test]
    fn test_random_ad_reaches_every_candidate() {
        let fixture = create_test_services(
            vec![slot(1, THREAD_SLOT_CLASS, json!({}))],
            vec![ad(5, 1), ad(6, 1), ad(7, 1)],
        );
        let engine = start(&fixture, Visitor::guest()).engine;

        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..200 {
            if let Some(ad) = engine.random_ad_by_slot_id_with(1, &mut rng) {
                seen.insert(ad.ad_id);
            }
        }
        assert_eq!(seen.into_iter().collect::<Vec<_>>(), vec![5, 6, 7]);
    }

    #[test]
    fn test_inactive_slot_class_short_circuits() {
        let fixture = two_slot_fixture();
        let mut engine = start(&fixture, Visitor::guest()).engine;

        assert_eq!(engine.ad_ids_should_be_served("Sidebar", &thread_args(3, 0)), None);
        assert!(!engine.ad_has_been_served());
    }

    #[test]
    fn test_template_hook_renders_served_ads() {
        let fixture = two_slot_fixture();
        let mut engine = start(&fixture, Visitor::guest()).engine;

        assert_eq!(engine.ad_ids_should_be_served(THREAD_SLOT_CLASS, &thread_args(3, 0)), Some(5));
        assert_eq!(engine.ad_ids_should_be_served(THREAD_SLOT_CLASS, &thread_args(3, 4)), Some(7));

        let mut contents = TEST_AD_HTML.to_string();
        engine.on_template_hook("ad_hook", &mut contents, &hook_params(THREAD_SLOT_CLASS, "5,7"));

        let expected = format!(
            "{}{}",
            rendered_test_ad(5),
            rendered_test_ad(7),
        );
        assert_eq!(contents, expected);

        let mut served = engine.served_ad_ids();
        served.sort_unstable();
        assert_eq!(served, vec![5, 7]);
    }

    fn rendered_test_ad(ad_id: AdId) -> String {
        format!(
            r#"<li class="ad"><img src="https://forum.example.com/avatar_s.png" /><a href="https://ads.example.com/{ad_id}">Ad {ad_id}</a><p>Description {ad_id}</p><em>Sponsored</em></li>"#
        )
    }

    #[test]
    fn test_template_hook_drops_invalid_ids() {
        let fixture = create_test_services(
            vec![
                slot(1, THREAD_SLOT_CLASS, json!({"threadIndex": 0})),
                slot(2, THREAD_SLOT_CLASS, json!({"threadIndex": 1})),
            ],
            vec![ad(5, 1), ad(9, 2)],
        );
        let mut engine = start(&fixture, Visitor::guest()).engine;
        assert_eq!(
            engine.ad_ids_should_be_served(THREAD_SLOT_CLASS, &[json!("search_result"), json!(0)]),
            Some(5)
        );
        assert_eq!(
            engine.ad_ids_should_be_served(THREAD_SLOT_CLASS, &[json!("search_result"), json!(1)]),
            Some(9)
        );

        let mut contents = "[{title}]".to_string();
        engine.on_template_hook(
            "ad_hook",
            &mut contents,
            &hook_params(THREAD_SLOT_CLASS, "5,-1,abc,9"),
        );
        assert_eq!(contents, "[Ad 5][Ad 9]");
    }

    #[test]
    fn test_template_hook_no_ops() {
        let fixture = two_slot_fixture();
        let mut engine = start(&fixture, Visitor::guest()).engine;
        engine.mark_served(1, 5);

        let original = "{title}".to_string();

        let mut contents = original.clone();
        engine.on_template_hook("other_hook", &mut contents, &hook_params(THREAD_SLOT_CLASS, "5"));
        assert_eq!(contents, original);

        let mut contents = original.clone();
        let mut params = hook_params(THREAD_SLOT_CLASS, "5");
        params.remove(HOOK_PARAM_AD_IDS);
        engine.on_template_hook("ad_hook", &mut contents, &params);
        assert_eq!(contents, original);

        let mut contents = original.clone();
        let mut params = hook_params(THREAD_SLOT_CLASS, "5");
        params.remove(HOOK_PARAM_SLOT_CLASS);
        engine.on_template_hook("ad_hook", &mut contents, &params);
        assert_eq!(contents, original);

        let mut contents = original.clone();
        engine.on_template_hook("ad_hook", &mut contents, &hook_params("Sidebar", "5"));
        assert_eq!(contents, original);
    }

    #[test]
    fn test_template_hook_skips_unserved_ads() {
        let fixture = two_slot_fixture();
        let mut engine = start(&fixture, Visitor::guest()).engine;
        engine.mark_served(1, 5);

        let mut contents = "[{title}]".to_string();
        engine.on_template_hook("ad_hook", &mut contents, &hook_params(THREAD_SLOT_CLASS, "5,7"));
        assert_eq!(contents, "[Ad 5]");
    }

    #[test]
    fn test_blank_hook_contents_use_ad_html() {
        let fixture = two_slot_fixture();
        let mut engine = start(&fixture, Visitor::guest()).engine;
        engine.mark_served(1, 5);

        let mut contents = String::new();
        engine.on_template_hook("ad_hook", &mut contents, &hook_params(THREAD_SLOT_CLASS, "5"));
        assert_eq!(contents, rendered_test_ad(5));
    }

    #[test]
    fn test_thread_list_scenario_serves_once() {
        let fixture = create_test_services(
            vec![
                slot(1, THREAD_SLOT_CLASS, json!({"forumIds": [3], "threadIndex": 0})),
                slot(2, THREAD_SLOT_CLASS, json!({"forumIds": [3], "threadIndex": 2})),
                slot(3, THREAD_SLOT_CLASS, json!({"forumIds": [8], "threadIndex": 2})),
            ],
            vec![ad(5, 1), ad(6, 2), ad(7, 3)],
        );
        let mut engine = start(&fixture, Visitor::guest()).engine;

        let served = engine.ad_ids_should_be_served(THREAD_SLOT_CLASS, &thread_args(3, 2));
        assert_eq!(served, Some(6));
        assert_eq!(fixture.view_log.view_count(6), 1);
        assert_eq!(engine.served_slot_and_ad(6).0.map(|s| s.slot_id), Some(2));

        let again = engine.ad_ids_should_be_served(THREAD_SLOT_CLASS, &thread_args(3, 2));
        assert_eq!(again, None);
        assert_eq!(engine.served_ad_ids(), vec![6]);
    }

    #[test]
    fn test_first_matching_slot_wins_in_id_order() {
        let fixture = create_test_services(
            vec![
                slot(4, THREAD_SLOT_CLASS, json!({"forumIds": [3], "threadIndex": 1})),
                slot(2, THREAD_SLOT_CLASS, json!({"forumIds": [3], "threadIndex": 1})),
            ],
            vec![ad(40, 4), ad(20, 2)],
        );
        let mut engine = start(&fixture, Visitor::guest()).engine;

        assert_eq!(engine.ad_ids_should_be_served(THREAD_SLOT_CLASS, &thread_args(3, 1)), Some(20));
        assert_eq!(engine.ad_ids_should_be_served(THREAD_SLOT_CLASS, &thread_args(3, 1)), Some(40));
        assert!(!engine.is_slot_class_active(THREAD_SLOT_CLASS));
    }

    #[test]
    fn test_malformed_position_args_serve_nothing() {
        let fixture = two_slot_fixture();
        let mut engine = start(&fixture, Visitor::guest()).engine;

        let cases: Vec<Vec<Value>> = vec![
            vec![],
            vec![json!("thread_list_item")],
            vec![json!("thread_list_item"), json!({"node_id": 3}), json!({"thread_id": 1})],
            vec![json!("search_result"), json!("0")],
            vec![json!("unknown"), json!(0)],
        ];
        for args in cases {
            assert_eq!(engine.ad_ids_should_be_served(THREAD_SLOT_CLASS, &args), None);
        }
        assert!(!engine.ad_has_been_served());
    }
}
