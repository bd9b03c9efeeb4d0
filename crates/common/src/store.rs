//! Host collaborators the engine reads from and writes to.
//!
//! The forum host owns storage, caching and view logging. These traits are the
//! seams the engine talks through; [`crate::memory`] provides in-process
//! implementations.

use std::collections::BTreeMap;
use std::sync::Arc;

use error_stack::Report;
use serde_json::Value;

use crate::error::AdEngineError;
use crate::models::{Ad, AdId, Slot, SlotId};

/// Filter accepted by [`AdStore`] queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// `Some(true)` keeps only active records, `Some(false)` only inactive.
    pub active: Option<bool>,
}

impl RecordFilter {
    #[must_use]
    pub fn active() -> Self {
        Self { active: Some(true) }
    }

    #[must_use]
    pub fn accepts(&self, active: bool) -> bool {
        match self.active {
            Some(wanted) => wanted == active,
            None => true,
        }
    }
}

/// Authoritative slot/ad storage.
pub trait AdStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`AdEngineError::Store`] if the slots cannot be read.
    fn slots(&self, filter: RecordFilter)
        -> Result<BTreeMap<SlotId, Slot>, Report<AdEngineError>>;

    /// Ads with their phrases and upload URLs already resolved for caching.
    ///
    /// # Errors
    ///
    /// Returns [`AdEngineError::Store`] if the ads cannot be read.
    fn ads(&self, filter: RecordFilter) -> Result<BTreeMap<AdId, Ad>, Report<AdEngineError>>;
}

/// Process-wide versioned key/value registry.
pub trait DataRegistry: Send + Sync {
    /// # Errors
    ///
    /// Returns [`AdEngineError::Registry`] if the backing store fails.
    fn get(&self, key: &str) -> Result<Option<Value>, Report<AdEngineError>>;

    /// # Errors
    ///
    /// Returns [`AdEngineError::Registry`] if the value cannot be stored.
    fn set(&self, key: &str, value: Value) -> Result<(), Report<AdEngineError>>;
}

/// Small, always-loaded cache for hot-path checks.
pub trait SimpleCache: Send + Sync {
    fn simple_cache_data(&self, key: &str) -> Option<Value>;

    fn set_simple_cache_data(&self, key: &str, value: Value);
}

/// Records ad impressions.
pub trait ViewLogger: Send + Sync {
    fn log_ad_view(&self, ad_id: AdId);
}

/// Shared handles to every host collaborator.
#[derive(Clone)]
pub struct HostServices {
    pub store: Arc<dyn AdStore>,
    pub registry: Arc<dyn DataRegistry>,
    pub simple_cache: Arc<dyn SimpleCache>,
    pub view_logger: Arc<dyn ViewLogger>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_filter() {
        assert!(RecordFilter::default().accepts(true));
        assert!(RecordFilter::default().accepts(false));
        assert!(RecordFilter::active().accepts(true));
        assert!(!RecordFilter::active().accepts(false));
    }
}
