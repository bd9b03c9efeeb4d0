//! Per-request partition of the snapshot into available and served entries.

use std::collections::BTreeMap;

use crate::models::{Ad, AdId, Slot, SlotId};
use crate::snapshot::ActiveAdsSnapshot;

/// Available and served slots/ads for one request.
///
/// Entries are moved between the two sides, so a slot or ad is never present
/// in both.
#[derive(Debug, Default)]
pub struct ServedState {
    available_slots: BTreeMap<SlotId, Slot>,
    available_ads: BTreeMap<SlotId, BTreeMap<AdId, Ad>>,
    served_slots: BTreeMap<SlotId, Slot>,
    served_ads: BTreeMap<AdId, Ad>,
}

/// What [`ServedState::mark`] actually moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkOutcome {
    pub slot_moved: bool,
    pub ad_moved: bool,
}

impl ServedState {
    #[must_use]
    pub fn from_snapshot(snapshot: ActiveAdsSnapshot) -> Self {
        Self {
            available_slots: snapshot.slots,
            available_ads: snapshot.ads_grouped,
            ..Self::default()
        }
    }

    pub fn available_slots(&self) -> impl Iterator<Item = &Slot> {
        self.available_slots.values()
    }

    #[must_use]
    pub fn available_ads(&self, slot_id: SlotId) -> Option<&BTreeMap<AdId, Ad>> {
        self.available_ads.get(&slot_id)
    }

    /// Moves the slot and the ad to the served side, whichever are present.
    pub fn mark(&mut self, slot_id: SlotId, ad_id: AdId) -> MarkOutcome {
        let slot_moved = match self.available_slots.remove(&slot_id) {
            Some(slot) => {
                self.served_slots.insert(slot_id, slot);
                true
            }
            None => false,
        };

        let ad_moved = match self
            .available_ads
            .get_mut(&slot_id)
            .and_then(|ads| ads.remove(&ad_id))
        {
            Some(ad) => {
                self.served_ads.insert(ad_id, ad);
                true
            }
            None => false,
        };

        MarkOutcome {
            slot_moved,
            ad_moved,
        }
    }

    #[must_use]
    pub fn served_ad(&self, ad_id: AdId) -> Option<&Ad> {
        self.served_ads.get(&ad_id)
    }

    #[must_use]
    pub fn served_slot(&self, slot_id: SlotId) -> Option<&Slot> {
        self.served_slots.get(&slot_id)
    }

    pub fn served_ad_ids(&self) -> impl Iterator<Item = AdId> + '_ {
        self.served_ads.keys().copied()
    }
}
