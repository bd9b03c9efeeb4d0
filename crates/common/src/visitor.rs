//! The current viewer, as seen by ad targeting and exemption checks.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Attributes of the visitor rendering the current page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Visitor {
    /// Zero for guests.
    #[serde(default)]
    pub user_id: u32,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub user_group_id: u32,
    #[serde(default)]
    pub secondary_group_ids: Vec<u32>,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub like_count: u64,
    /// Unix timestamp of registration; zero for guests.
    #[serde(default)]
    pub register_date: i64,
    #[serde(default)]
    pub is_staff: bool,
    /// Granted permissions, keyed by permission group.
    #[serde(default)]
    pub permissions: BTreeMap<String, BTreeSet<String>>,
}

impl Visitor {
    #[must_use]
    pub fn guest() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_guest(&self) -> bool {
        self.user_id == 0
    }

    /// True when the visitor's primary or any secondary group is `group_id`.
    #[must_use]
    pub fn is_member_of(&self, group_id: u32) -> bool {
        self.user_group_id == group_id || self.secondary_group_ids.contains(&group_id)
    }

    #[must_use]
    pub fn has_permission(&self, group: &str, permission: &str) -> bool {
        self.permissions
            .get(group)
            .is_some_and(|granted| granted.contains(permission))
    }

    /// Grants `permission` in `group`, returning the visitor for chaining.
    #[must_use]
    pub fn with_permission(mut self, group: &str, permission: &str) -> Self {
        self.permissions
            .entry(group.to_string())
            .or_default()
            .insert(permission.to_string());
        self
    }
}
