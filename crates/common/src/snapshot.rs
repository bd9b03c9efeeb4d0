//! The cached active-ads snapshot and the active slot class set.
//!
//! The snapshot is derived data: it is rebuilt from the [`AdStore`] whenever
//! the registry copy is missing, does not deserialize, or carries a version
//! older than [`ENGINE_VERSION`]. Concurrent rebuilds simply overwrite each
//! other.
//!
//! [`AdStore`]: crate::store::AdStore

use std::collections::{BTreeMap, BTreeSet};

use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AdEngineError;
use crate::models::{Ad, AdId, Slot, SlotId};
use crate::settings::EngineSettings;
use crate::store::{HostServices, RecordFilter, SimpleCache};

/// Bumped whenever the snapshot layout or its derivation changes.
pub const ENGINE_VERSION: u64 = 2015102202;

/// Active slots and their active ads, grouped by slot.
///
/// Maps iterate in ascending id order, which is the order slot matching
/// walks them in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveAdsSnapshot {
    pub version: u64,
    pub slots: BTreeMap<SlotId, Slot>,
    #[serde(rename = "adsGrouped")]
    pub ads_grouped: BTreeMap<SlotId, BTreeMap<AdId, Ad>>,
}

/// Why a cached snapshot was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotStatus {
    Fresh,
    Missing,
    Malformed,
    Stale { version: u64 },
}

impl ActiveAdsSnapshot {
    /// Builds a snapshot from active slots and ads.
    ///
    /// Ads whose slot is not among `slots` are dropped, and only slots that
    /// own at least one ad are kept.
    #[must_use]
    pub fn build(slots: &BTreeMap<SlotId, Slot>, ads: BTreeMap<AdId, Ad>) -> Self {
        let mut snapshot = Self {
            version: ENGINE_VERSION,
            ..Self::default()
        };

        for (ad_id, ad) in ads {
            let Some(slot) = slots.get(&ad.slot_id) else {
                continue;
            };
            snapshot
                .slots
                .entry(ad.slot_id)
                .or_insert_with(|| slot.clone());
            snapshot
                .ads_grouped
                .entry(ad.slot_id)
                .or_default()
                .insert(ad_id, ad);
        }

        snapshot
    }

    /// Interprets a registry value, returning the snapshot only when it is
    /// well formed and current.
    #[must_use]
    pub fn from_cached(value: Option<Value>) -> (Option<Self>, SnapshotStatus) {
        let Some(value) = value else {
            return (None, SnapshotStatus::Missing);
        };

        let snapshot: Self = match serde_json::from_value(value) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log::warn!("Discarding malformed active-ads snapshot: {err}");
                return (None, SnapshotStatus::Malformed);
            }
        };

        if snapshot.version == 0 || snapshot.version < ENGINE_VERSION {
            return (
                None,
                SnapshotStatus::Stale {
                    version: snapshot.version,
                },
            );
        }

        (Some(snapshot), SnapshotStatus::Fresh)
    }

    #[must_use]
    pub fn active_slot_classes(&self) -> ActiveSlotClasses {
        ActiveSlotClasses::from_slots(self.slots.values())
    }

    #[must_use]
    pub fn ad_count(&self) -> usize {
        self.ads_grouped.values().map(BTreeMap::len).sum()
    }
}

/// Distinct slot classes among a set of slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActiveSlotClasses(BTreeSet<String>);

impl ActiveSlotClasses {
    pub fn from_slots<'a>(slots: impl IntoIterator<Item = &'a Slot>) -> Self {
        Self(
            slots
                .into_iter()
                .map(|slot| slot.slot_class.clone())
                .collect(),
        )
    }

    /// Reads the set from the simple cache; anything unreadable is empty.
    #[must_use]
    pub fn load(cache: &dyn SimpleCache, key: &str) -> Self {
        cache
            .simple_cache_data(key)
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    /// Exact, case-sensitive membership. An empty set contains nothing.
    #[must_use]
    pub fn contains(&self, slot_class: &str) -> bool {
        self.0.contains(slot_class)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Whether `slot_class` is in the simple-cache copy of the active classes.
///
/// Reads nothing but the simple cache, so hosts call it before building an
/// [`Engine`](crate::engine::Engine) for a page position. An empty or absent
/// set means no class is active.
#[must_use]
pub fn is_slot_class_active(cache: &dyn SimpleCache, key: &str, slot_class: &str) -> bool {
    ActiveSlotClasses::load(cache, key).contains(slot_class)
}

/// Recomputes the snapshot from the store and publishes it.
///
/// Writes the snapshot to the data registry and the slot classes to the
/// simple cache. Safe to call repeatedly; the last writer wins. A rejected
/// registry write is logged and the built snapshot is still returned.
///
/// # Errors
///
/// Returns an error if the store cannot be read or the snapshot cannot be
/// serialized.
pub fn refresh_active_ads(
    services: &HostServices,
    settings: &EngineSettings,
) -> Result<ActiveAdsSnapshot, Report<AdEngineError>> {
    let slots = services
        .store
        .slots(RecordFilter::active())
        .attach("while loading active slots")?;
    let ads = services
        .store
        .ads(RecordFilter::active())
        .attach("while loading active ads")?;

    let snapshot = ActiveAdsSnapshot::build(&slots, ads);
    let slot_classes = snapshot.active_slot_classes();

    let value = serde_json::to_value(&snapshot).change_context(AdEngineError::Serialization {
        message: "Failed to serialize active-ads snapshot".to_string(),
    })?;
    if let Err(report) = services.registry.set(&settings.registry_key, value) {
        log::warn!("Failed to store active-ads snapshot: {report:?}");
    }

    let classes_value =
        serde_json::to_value(&slot_classes).change_context(AdEngineError::Serialization {
            message: "Failed to serialize active slot classes".to_string(),
        })?;
    services
        .simple_cache
        .set_simple_cache_data(&settings.slot_classes_cache_key, classes_value);

    log::info!(
        "Rebuilt active-ads snapshot: {} slots, {} ads, classes [{}]",
        snapshot.slots.len(),
        snapshot.ad_count(),
        slot_classes.iter().collect::<Vec<_>>().join(", ")
    );

    Ok(snapshot)
}
