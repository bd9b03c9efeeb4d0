//! In-process implementations of the host collaborators.
//!
//! Used by the CLI and by tests. The registry keeps a write counter per key so
//! callers can observe how often the snapshot was rebuilt.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use error_stack::Report;
use serde_json::Value;

use crate::error::AdEngineError;
use crate::models::{Ad, AdId, Slot, SlotId};
use crate::store::{AdStore, DataRegistry, RecordFilter, SimpleCache, ViewLogger};

#[derive(Debug, Default)]
pub struct InMemoryAdStore {
    slots: RwLock<BTreeMap<SlotId, Slot>>,
    ads: RwLock<BTreeMap<AdId, Ad>>,
}

impl InMemoryAdStore {
    #[must_use]
    pub fn new(slots: Vec<Slot>, ads: Vec<Ad>) -> Self {
        let store = Self::default();
        for slot in slots {
            store.insert_slot(slot);
        }
        for ad in ads {
            store.insert_ad(ad);
        }
        store
    }

    pub fn insert_slot(&self, slot: Slot) {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(slot.slot_id, slot);
    }

    pub fn insert_ad(&self, ad: Ad) {
        self.ads
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ad.ad_id, ad);
    }
}

impl AdStore for InMemoryAdStore {
    fn slots(
        &self,
        filter: RecordFilter,
    ) -> Result<BTreeMap<SlotId, Slot>, Report<AdEngineError>> {
        let slots = self.slots.read().map_err(|_| {
            Report::new(AdEngineError::Store {
                message: "slot table lock poisoned".to_string(),
            })
        })?;
        Ok(slots
            .iter()
            .filter(|(_, slot)| filter.accepts(slot.active))
            .map(|(id, slot)| (*id, slot.clone()))
            .collect())
    }

    fn ads(&self, filter: RecordFilter) -> Result<BTreeMap<AdId, Ad>, Report<AdEngineError>> {
        let ads = self.ads.read().map_err(|_| {
            Report::new(AdEngineError::Store {
                message: "ad table lock poisoned".to_string(),
            })
        })?;
        Ok(ads
            .iter()
            .filter(|(_, ad)| filter.accepts(ad.active))
            .map(|(id, ad)| (*id, ad.clone()))
            .collect())
    }
}

/// Serves as both the data registry and the simple cache.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    entries: RwLock<HashMap<String, Value>>,
    simple: RwLock<HashMap<String, Value>>,
    writes: RwLock<HashMap<String, usize>>,
}

impl InMemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of [`DataRegistry::set`] calls made for `key`.
    #[must_use]
    pub fn write_count(&self, key: &str) -> usize {
        self.writes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

impl DataRegistry for InMemoryRegistry {
    fn get(&self, key: &str) -> Result<Option<Value>, Report<AdEngineError>> {
        let entries = self.entries.read().map_err(|_| {
            Report::new(AdEngineError::Registry {
                message: format!("registry lock poisoned reading '{key}'"),
            })
        })?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), Report<AdEngineError>> {
        let mut entries = self.entries.write().map_err(|_| {
            Report::new(AdEngineError::Registry {
                message: format!("registry lock poisoned writing '{key}'"),
            })
        })?;
        entries.insert(key.to_string(), value);
        *self
            .writes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default() += 1;
        Ok(())
    }
}

impl SimpleCache for InMemoryRegistry {
    fn simple_cache_data(&self, key: &str) -> Option<Value> {
        self.simple
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set_simple_cache_data(&self, key: &str, value: Value) {
        self.simple
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewRecord {
    pub count: u64,
    pub last_viewed_at: DateTime<Utc>,
}

/// Per-ad view counters.
#[derive(Debug, Default)]
pub struct InMemoryViewLog {
    views: RwLock<BTreeMap<AdId, ViewRecord>>,
}

impl InMemoryViewLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn view_count(&self, ad_id: AdId) -> u64 {
        self.record(ad_id).map_or(0, |record| record.count)
    }

    #[must_use]
    pub fn record(&self, ad_id: AdId) -> Option<ViewRecord> {
        self.views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&ad_id)
            .copied()
    }

    #[must_use]
    pub fn total_views(&self) -> u64 {
        self.views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|record| record.count)
            .sum()
    }
}

impl ViewLogger for InMemoryViewLog {
    fn log_ad_view(&self, ad_id: AdId) {
        let now = Utc::now();
        let mut views = self.views.write().unwrap_or_else(PoisonError::into_inner);
        let record = views.entry(ad_id).or_insert(ViewRecord {
            count: 0,
            last_viewed_at: now,
        });
        record.count += 1;
        record.last_viewed_at = now;
        log::debug!("Logged view for ad {ad_id} (total {})", record.count);
    }
}
