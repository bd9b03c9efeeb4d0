//! Ads placed between threads in a forum's thread list or between search
//! results.
//!
//! A slot targets a position with its `threadIndex` option (zero-based,
//! default 0). Thread-list slots additionally list the forums they appear in
//! under `forumIds`.

use std::sync::Arc;

use error_stack::Report;
use serde_json::{json, Map, Value};
use url::Url;

use crate::engine::Engine;
use crate::error::AdEngineError;
use crate::models::{coerce_int, Ad, AdConfigOptions, AdId, Slot};
use crate::settings::{RenderSettings, Settings};

use super::render::Placeholders;
use super::{base, OptionsTemplate, SlotStrategy};

pub const THREAD_SLOT_CLASS: &str = "Thread";

/// Key the host annotates each thread with: its zero-based index in the page.
pub const THREAD_INDEX_KEY: &str = "index_in_threads";

const OPTION_FORUM_IDS: &str = "forumIds";
const OPTION_THREAD_INDEX: &str = "threadIndex";
const OPTION_SPONSORED_TEXT: &str = "sponsoredText";
const UPLOAD_AVATAR: &str = "avatar";

/// Page position a thread ad is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    ThreadListItem { forum_id: i64, thread_index: i64 },
    SearchResult { index: i64 },
}

impl Placement {
    /// Parses the host's positional arguments.
    ///
    /// - `["thread_list_item", forum, thread]`: `forum` must carry `node_id`,
    ///   `thread` must carry `thread_id` and [`THREAD_INDEX_KEY`].
    /// - `["search_result", index]`: `index` must be an integer.
    ///
    /// Hyphenated tags are accepted too. Anything else yields `None`.
    #[must_use]
    pub fn from_args(args: &[Value]) -> Option<Self> {
        let (position, rest) = args.split_first()?;
        match position.as_str()? {
            "thread_list_item" | "thread-list-item" => {
                let [forum, thread, ..] = rest else {
                    return None;
                };
                let forum_id = required_int(forum, "node_id")?;
                required_present(thread, "thread_id")?;
                let thread_index = required_int(thread, THREAD_INDEX_KEY)?;
                Some(Placement::ThreadListItem {
                    forum_id,
                    thread_index,
                })
            }
            "search_result" | "search-result" | "_search_result" => {
                let index = rest.first()?.as_i64()?;
                Some(Placement::SearchResult { index })
            }
            _ => None,
        }
    }

    /// Whether `slot` is configured for this position.
    #[must_use]
    pub fn matches(&self, slot: &Slot) -> bool {
        let slot_index = slot.int_option(OPTION_THREAD_INDEX, 0);
        match self {
            Placement::ThreadListItem {
                forum_id,
                thread_index,
            } => {
                slot.id_list_option(OPTION_FORUM_IDS).contains(forum_id)
                    && slot_index == *thread_index
            }
            Placement::SearchResult { index } => slot_index == *index,
        }
    }
}

fn required_present<'a>(object: &'a Value, key: &str) -> Option<&'a Value> {
    object.as_object()?.get(key).filter(|value| !value.is_null())
}

fn required_int(object: &Value, key: &str) -> Option<i64> {
    required_present(object, key).and_then(coerce_int)
}

#[derive(Debug, Clone)]
pub struct ThreadSlot {
    render: RenderSettings,
}

impl ThreadSlot {
    #[must_use]
    pub fn new(render: RenderSettings) -> Self {
        Self { render }
    }
}

pub fn register(settings: &Settings) -> Arc<dyn SlotStrategy> {
    Arc::new(ThreadSlot::new(settings.render.clone()))
}

impl SlotStrategy for ThreadSlot {
    fn slot_class(&self) -> &'static str {
        THREAD_SLOT_CLASS
    }

    fn slot_options_template_name(&self) -> &'static str {
        "ad_slot_options_thread"
    }

    fn ad_options_template_name(&self) -> &'static str {
        "ad_ad_options_thread"
    }

    fn prepare_slot_options_template(&self, slot: &Slot) -> OptionsTemplate {
        let mut template = base::prepare_slot_options_template(self, slot);
        template.params.insert(
            "forumIds".to_string(),
            json!(slot.id_list_option(OPTION_FORUM_IDS)),
        );
        template
    }

    fn prepare_ad_options_template(&self, ad: &Ad, slot: &Slot) -> OptionsTemplate {
        let mut template = base::prepare_ad_options_template(self, ad, slot);
        template.params.insert(
            "slotForumIds".to_string(),
            json!(slot.id_list_option(OPTION_FORUM_IDS)),
        );
        template
    }

    fn allow_upload(&self, _slot: &Slot, option_key: &str) -> bool {
        option_key == UPLOAD_AVATAR
    }

    fn verify_ad_options(
        &self,
        slot: &Slot,
        ad_options: &Map<String, Value>,
        config_options: &AdConfigOptions,
    ) -> Result<(), Report<AdEngineError>> {
        verify_link(ad_options)?;
        base::verify_ad_options(slot, ad_options, config_options)
    }

    fn ad_ids_should_be_served(&self, engine: &mut Engine, args: &[Value]) -> Option<AdId> {
        let placement = Placement::from_args(args)?;

        let slot_id = engine
            .slots_by_class(THREAD_SLOT_CLASS)
            .into_values()
            .find(|slot| placement.matches(slot))
            .map(|slot| slot.slot_id)?;

        let Some(ad_id) = engine.random_ad_by_slot_id(slot_id).map(|ad| ad.ad_id) else {
            log::debug!("Slot {slot_id} matched {placement:?} but has no eligible ad");
            return None;
        };

        engine.mark_served(slot_id, ad_id);
        Some(ad_id)
    }

    fn render_ad_html(&self, ad: &Ad, slot: &Slot, html: &str) -> String {
        let avatar_url = ad
            .upload_url(UPLOAD_AVATAR)
            .unwrap_or(&self.render.default_avatar_url);
        let sponsored_text = slot
            .str_option(OPTION_SPONSORED_TEXT)
            .unwrap_or(&self.render.sponsored_text);

        Placeholders::new()
            .text("title", ad.phrase("title"))
            .text("description", ad.phrase("description"))
            .escaped("link", ad.link())
            .text("avatarUrl", avatar_url)
            .text("sponsoredText", sponsored_text)
            .apply(html)
    }
}

fn verify_link(ad_options: &Map<String, Value>) -> Result<(), Report<AdEngineError>> {
    let link = ad_options
        .get("link")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();

    if link.is_empty() {
        return Err(Report::new(AdEngineError::InvalidAdOptions {
            message: "a link is required".to_string(),
        }));
    }

    match Url::parse(link) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(Report::new(AdEngineError::InvalidAdOptions {
            message: format!("'{link}' is not a valid http(s) link"),
        })),
    }
}
