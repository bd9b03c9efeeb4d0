use std::collections::BTreeMap;
use std::sync::Arc;

use crate::settings::Settings;

use super::SlotStrategy;

/// Slot strategies keyed by slot class.
#[derive(Clone, Default)]
pub struct SlotStrategyRegistry {
    inner: Arc<BTreeMap<&'static str, Arc<dyn SlotStrategy>>>,
}

impl SlotStrategyRegistry {
    /// Build a registry holding every built-in strategy.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self::from_strategies(super::builders().iter().map(|build| build(settings)))
    }

    pub fn from_strategies(strategies: impl IntoIterator<Item = Arc<dyn SlotStrategy>>) -> Self {
        let mut inner = BTreeMap::new();
        for strategy in strategies {
            log::debug!("Registering slot strategy '{}'", strategy.slot_class());
            inner.insert(strategy.slot_class(), strategy);
        }
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Strategy for `slot_class`, if one is registered.
    #[must_use]
    pub fn get(&self, slot_class: &str) -> Option<Arc<dyn SlotStrategy>> {
        self.inner.get(slot_class).cloned()
    }

    pub fn slot_classes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.inner.keys().copied()
    }
}

impl std::fmt::Debug for SlotStrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.slot_classes()).finish()
    }
}
