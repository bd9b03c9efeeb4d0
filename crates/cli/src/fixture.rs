//! JSON fixtures describing a forum's slots, ads and the visiting user.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use forum_ads_common::memory::{InMemoryAdStore, InMemoryRegistry, InMemoryViewLog};
use forum_ads_common::models::{Ad, Slot};
use forum_ads_common::store::HostServices;
use forum_ads_common::visitor::Visitor;
use serde::Deserialize;

use crate::error::CliError;

#[derive(Debug, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub slots: Vec<Slot>,
    #[serde(default)]
    pub ads: Vec<Ad>,
    #[serde(default)]
    pub visitor: Visitor,
}

impl Fixture {
    pub fn load(file: &Path) -> Result<Self, CliError> {
        let content = fs::read_to_string(file)?;
        serde_json::from_str(&content)
            .map_err(|e| CliError::Fixture(format!("{}: {e}", file.display())))
    }

    /// In-memory host services seeded with the fixture's records.
    ///
    /// Nothing is published yet: the registry and simple cache start empty.
    pub fn services(&self) -> FixtureServices {
        let registry = Arc::new(InMemoryRegistry::new());
        let view_log = Arc::new(InMemoryViewLog::new());
        let services = HostServices {
            store: Arc::new(InMemoryAdStore::new(self.slots.clone(), self.ads.clone())),
            registry: registry.clone(),
            simple_cache: registry.clone(),
            view_logger: view_log.clone(),
        };
        FixtureServices {
            services,
            registry,
            view_log,
        }
    }
}

/// Host services for a fixture plus typed handles for reporting.
pub struct FixtureServices {
    pub services: HostServices,
    pub registry: Arc<InMemoryRegistry>,
    pub view_log: Arc<InMemoryViewLog>,
}
