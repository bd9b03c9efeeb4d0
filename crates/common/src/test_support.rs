#[cfg(test)]
pub mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};

    use crate::memory::{InMemoryAdStore, InMemoryRegistry, InMemoryViewLog};
    use crate::models::{Ad, AdId, Slot, SlotId};
    use crate::settings::Settings;
    use crate::store::HostServices;

    pub const TEST_AD_HTML: &str = r#"<li class="ad"><img src="{avatarUrl}" /><a href="{link}">{title}</a><p>{description}</p><em>{sponsoredText}</em></li>"#;

    pub fn slot(slot_id: SlotId, slot_class: &str, options: Value) -> Slot {
        serde_json::from_value(json!({
            "slot_id": slot_id,
            "slot_class": slot_class,
            "active": true,
            "slot_options": options,
        }))
        .expect("Invalid test slot")
    }

    pub fn ad(ad_id: AdId, slot_id: SlotId) -> Ad {
        serde_json::from_value(json!({
            "ad_id": ad_id,
            "slot_id": slot_id,
            "active": true,
            "ad_options": {"link": format!("https://ads.example.com/{ad_id}")},
            "phrases": {
                "title": format!("Ad {ad_id}"),
                "description": format!("Description {ad_id}"),
            },
            "ad_html": TEST_AD_HTML,
        }))
        .expect("Invalid test ad")
    }

    pub fn ad_with_criteria(ad_id: AdId, slot_id: SlotId, criteria: Value) -> Ad {
        let mut ad = ad(ad_id, slot_id);
        ad.ad_config_options.user_criteria =
            Some(serde_json::from_value(criteria).expect("Invalid test criteria"));
        ad
    }

    pub struct TestServices {
        pub services: HostServices,
        pub store: Arc<InMemoryAdStore>,
        pub registry: Arc<InMemoryRegistry>,
        pub view_log: Arc<InMemoryViewLog>,
    }

    pub fn create_test_services(slots: Vec<Slot>, ads: Vec<Ad>) -> TestServices {
        let store = Arc::new(InMemoryAdStore::new(slots, ads));
        let registry = Arc::new(InMemoryRegistry::new());
        let view_log = Arc::new(InMemoryViewLog::new());

        TestServices {
            services: HostServices {
                store: store.clone(),
                registry: registry.clone(),
                simple_cache: registry.clone(),
                view_logger: view_log.clone(),
            },
            store,
            registry,
            view_log,
        }
    }

    pub fn create_test_settings() -> Settings {
        Settings::from_toml(
            r#"
            [engine]
            registry_key = "test_active_ads"
            slot_classes_cache_key = "test_active_slot_classes"
            hook_name = "ad_hook"

            [render]
            sponsored_text = "Sponsored"
            default_avatar_url = "https://forum.example.com/avatar_s.png"
            "#,
        )
        .expect("Invalid config")
    }
}
