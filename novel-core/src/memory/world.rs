//! Core settings and the world view.

use super::lenient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Keys kept in core settings for bookkeeping only, never shown in context.
pub const BOOKKEEPING_KEYS: &[&str] = &[
    "version",
    "created_at",
    "updated_at",
    "memory_hierarchy",
    "chapter_plan",
];

/// Facts that must never be dropped from a chapter's context.
///
/// Arbitrary keys map to strings, numbers, or nested maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoreSettings(BTreeMap<String, Value>);

impl CoreSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Amend settings; later entries win.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = (String, Value)>) {
        self.0.extend(entries);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Entries that belong in a context bundle.
    pub fn context_entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0
            .iter()
            .filter(|(key, _)| !BOOKKEEPING_KEYS.contains(&key.as_str()))
    }

    /// String value for `key`, if present and a string.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

/// The single world-building record of a project.
///
/// Replaced wholesale, never merged field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldView {
    #[serde(default, deserialize_with = "lenient::text")]
    pub basic_setting: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub time_period: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub geography: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub power_system: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub social_structure: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub culture: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub special_rules: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub history: String,
    #[serde(default, deserialize_with = "lenient::list")]
    pub factions: Vec<String>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub customs: Vec<String>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub taboos: Vec<String>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub limitations: Vec<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorldView {
    /// Free-text fields with their display labels, in presentation order.
    pub fn text_fields(&self) -> [(&'static str, &str); 8] {
        [
            ("基本设定", self.basic_setting.as_str()),
            ("时代背景", self.time_period.as_str()),
            ("地理环境", self.geography.as_str()),
            ("力量体系", self.power_system.as_str()),
            ("社会结构", self.social_structure.as_str()),
            ("文化", self.culture.as_str()),
            ("特殊规则", self.special_rules.as_str()),
            ("历史", self.history.as_str()),
        ]
    }

    /// List fields with their display labels, in presentation order.
    pub fn list_fields(&self) -> [(&'static str, &[String]); 4] {
        [
            ("势力", self.factions.as_slice()),
            ("风俗", self.customs.as_slice()),
            ("禁忌", self.taboos.as_slice()),
            ("限制", self.limitations.as_slice()),
        ]
    }

    /// Whether no field carries any content.
    pub fn is_empty(&self) -> bool {
        self.text_fields().iter().all(|(_, v)| v.trim().is_empty())
            && self.list_fields().iter().all(|(_, v)| v.is_empty())
    }
}
