//! Placeholder substitution for ad HTML.

use std::collections::HashMap;

use handlebars::html_escape;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PLACEHOLDER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z]+)\}").expect("valid placeholder regex"));

/// Placeholder values for one ad.
#[derive(Debug, Default, Clone)]
pub struct Placeholders {
    values: HashMap<&'static str, String>,
}

impl Placeholders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `{name}` to `value` verbatim. Admin-authored copy may carry markup.
    #[must_use]
    pub fn text(mut self, name: &'static str, value: &str) -> Self {
        self.values.insert(name, value.to_string());
        self
    }

    /// Sets `{name}` to `value` escaped for use inside an HTML attribute.
    #[must_use]
    pub fn escaped(mut self, name: &'static str, value: &str) -> Self {
        self.values.insert(name, html_escape(value));
        self
    }

    /// Replaces every known placeholder in a single pass.
    ///
    /// Replacement text is never rescanned, so the result does not depend on
    /// substitution order. Unknown `{...}` tokens are left untouched.
    #[must_use]
    pub fn apply(&self, html: &str) -> String {
        PLACEHOLDER_PATTERN
            .replace_all(html, |caps: &Captures<'_>| match self.values.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}
