//! User criteria gating ad eligibility.
//!
//! Criteria are stored the way the host's admin forms submit them: a list of
//! `{ "rule": ..., "data": {...} }` entries. A visitor matches when every
//! entry matches. Entries are interpreted when matching, so a snapshot with a
//! rule this crate does not understand still loads; such a rule simply never
//! matches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::coerce_int;
use crate::visitor::Visitor;

const SECONDS_PER_DAY: i64 = 86_400;

/// One raw criterion entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub rule: String,
    #[serde(default)]
    pub data: Value,
}

impl Criterion {
    #[must_use]
    pub fn new(rule: &str, data: Value) -> Self {
        Self {
            rule: rule.to_string(),
            data,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserCriteria(pub Vec<Criterion>);

impl UserCriteria {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every criterion matches `visitor` at time `now`.
    #[must_use]
    pub fn matches(&self, visitor: &Visitor, now: DateTime<Utc>) -> bool {
        self.0.iter().all(|criterion| match Rule::parse(criterion) {
            Some(rule) => rule.matches(visitor, now),
            None => {
                log::debug!("Unrecognized user criterion '{}'", criterion.rule);
                false
            }
        })
    }

    /// Rule names that cannot be interpreted.
    #[must_use]
    pub fn unrecognized_rules(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|criterion| Rule::parse(criterion).is_none())
            .map(|criterion| criterion.rule.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Rule {
    UserGroups(Vec<u32>),
    NotUserGroups(Vec<u32>),
    IsGuest,
    IsLoggedIn,
    IsStaff,
    MessagesPosted(u64),
    MessagesMaximum(u64),
    LikeCount(u64),
    RegisteredDays(i64),
    Username(Vec<String>),
}

impl Rule {
    fn parse(criterion: &Criterion) -> Option<Self> {
        let data = &criterion.data;
        let rule = match criterion.rule.as_str() {
            "user_groups" => Rule::UserGroups(group_ids(data)?),
            "not_user_groups" => Rule::NotUserGroups(group_ids(data)?),
            "is_guest" => Rule::IsGuest,
            "is_logged_in" => Rule::IsLoggedIn,
            "is_staff" => Rule::IsStaff,
            "messages_posted" => Rule::MessagesPosted(non_negative(data, "messages")?),
            "messages_maximum" => Rule::MessagesMaximum(non_negative(data, "messages")?),
            "like_count" => Rule::LikeCount(non_negative(data, "likes")?),
            "registered_days" => Rule::RegisteredDays(data.get("days").and_then(coerce_int)?),
            "username" => Rule::Username(usernames(data)?),
            _ => return None,
        };
        Some(rule)
    }

    fn matches(&self, visitor: &Visitor, now: DateTime<Utc>) -> bool {
        match self {
            Rule::UserGroups(ids) => ids.iter().any(|id| visitor.is_member_of(*id)),
            Rule::NotUserGroups(ids) => !ids.iter().any(|id| visitor.is_member_of(*id)),
            Rule::IsGuest => visitor.is_guest(),
            Rule::IsLoggedIn => !visitor.is_guest(),
            Rule::IsStaff => visitor.is_staff,
            Rule::MessagesPosted(min) => visitor.message_count >= *min,
            Rule::MessagesMaximum(max) => visitor.message_count <= *max,
            Rule::LikeCount(min) => visitor.like_count >= *min,
            Rule::RegisteredDays(days) => {
                if visitor.register_date <= 0 {
                    return false;
                }
                let registered_for = (now.timestamp() - visitor.register_date) / SECONDS_PER_DAY;
                registered_for >= *days
            }
            Rule::Username(names) => names
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&visitor.username)),
        }
    }
}

fn group_ids(data: &Value) -> Option<Vec<u32>> {
    let ids = data.get("user_group_ids")?.as_array()?;
    Some(
        ids.iter()
            .filter_map(coerce_int)
            .filter_map(|id| u32::try_from(id).ok())
            .collect(),
    )
}

fn non_negative(data: &Value, key: &str) -> Option<u64> {
    data.get(key)
        .and_then(coerce_int)
        .and_then(|n| u64::try_from(n).ok())
}

fn usernames(data: &Value) -> Option<Vec<String>> {
    let names = data.get("names")?;
    let list = match names {
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => return None,
    };
    Some(list)
}
