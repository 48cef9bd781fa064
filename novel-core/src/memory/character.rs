//! Character profiles for story memory.

use super::lenient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Importance assigned when none is given.
pub const DEFAULT_IMPORTANCE: u8 = 5;

fn default_importance() -> u8 {
    DEFAULT_IMPORTANCE
}

/// One entry in a character's append-only development history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevelopmentNote {
    /// Chapter in which the development happened.
    pub chapter: u32,
    /// What changed.
    pub development: String,
    /// When the note was recorded.
    pub timestamp: DateTime<Utc>,
}

/// A character tracked across the whole novel.
///
/// The name is the only identity key; two profiles with the same name are
/// the same character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub age: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub gender: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub appearance: String,
    /// Role or social identity in the story.
    #[serde(default, deserialize_with = "lenient::text")]
    pub identity: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub personality: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub motivation: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub background: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub growth_arc: String,
    #[serde(default, deserialize_with = "lenient::list")]
    pub abilities: Vec<String>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub weaknesses: Vec<String>,
    /// Other character name to a free-text relation.
    #[serde(default, deserialize_with = "lenient::string_map")]
    pub relationships: BTreeMap<String, String>,
    #[serde(default)]
    pub development_history: Vec<DevelopmentNote>,
    /// 1 (background) to 10 (central).
    #[serde(default = "default_importance", deserialize_with = "lenient::importance")]
    pub importance: u8,
    /// Most recent chapter that developed this character.
    #[serde(default)]
    pub last_appearance: Option<u32>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A partial edit of a profile's descriptive attributes. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterUpdate {
    pub age: Option<String>,
    pub gender: Option<String>,
    pub appearance: Option<String>,
    pub identity: Option<String>,
    pub personality: Option<String>,
    pub motivation: Option<String>,
    pub background: Option<String>,
    pub growth_arc: Option<String>,
    pub abilities: Option<Vec<String>>,
    pub weaknesses: Option<Vec<String>>,
    pub importance: Option<u8>,
}

impl CharacterUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_personality(mut self, personality: impl Into<String>) -> Self {
        self.personality = Some(personality.into());
        self
    }

    pub fn with_motivation(mut self, motivation: impl Into<String>) -> Self {
        self.motivation = Some(motivation.into());
        self
    }

    pub fn with_abilities(mut self, abilities: Vec<String>) -> Self {
        self.abilities = Some(abilities);
        self
    }

    pub fn with_importance(mut self, importance: u8) -> Self {
        self.importance = Some(importance);
        self
    }
}

impl CharacterProfile {
    /// Create a profile with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age: String::new(),
            gender: String::new(),
            appearance: String::new(),
            identity: String::new(),
            personality: String::new(),
            motivation: String::new(),
            background: String::new(),
            growth_arc: String::new(),
            abilities: Vec::new(),
            weaknesses: Vec::new(),
            relationships: BTreeMap::new(),
            development_history: Vec::new(),
            importance: DEFAULT_IMPORTANCE,
            last_appearance: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_personality(mut self, personality: impl Into<String>) -> Self {
        self.personality = personality.into();
        self
    }

    pub fn with_motivation(mut self, motivation: impl Into<String>) -> Self {
        self.motivation = motivation.into();
        self
    }

    pub fn with_importance(mut self, importance: u8) -> Self {
        self.importance = importance.clamp(1, 10);
        self
    }

    pub fn with_abilities(mut self, abilities: Vec<String>) -> Self {
        self.abilities = abilities;
        self
    }

    pub fn with_last_appearance(mut self, chapter: u32) -> Self {
        self.last_appearance = Some(chapter);
        self
    }

    /// The most recent development note, if any.
    pub fn latest_development(&self) -> Option<&DevelopmentNote> {
        self.development_history.last()
    }

    /// Append a development note and mark the character as appearing.
    pub fn record_development(
        &mut self,
        chapter: u32,
        development: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.development_history.push(DevelopmentNote {
            chapter,
            development: development.into(),
            timestamp: now,
        });
        self.last_appearance = Some(chapter);
        self.updated_at = Some(now);
    }

    /// Overwrite the attributes `update` sets.
    pub fn apply(&mut self, update: CharacterUpdate, now: DateTime<Utc>) {
        fn set<T>(field: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *field = value;
            }
        }

        set(&mut self.age, update.age);
        set(&mut self.gender, update.gender);
        set(&mut self.appearance, update.appearance);
        set(&mut self.identity, update.identity);
        set(&mut self.personality, update.personality);
        set(&mut self.motivation, update.motivation);
        set(&mut self.background, update.background);
        set(&mut self.growth_arc, update.growth_arc);
        set(&mut self.abilities, update.abilities);
        set(&mut self.weaknesses, update.weaknesses);
        if let Some(importance) = update.importance {
            self.importance = importance.clamp(1, 10);
        }
        self.updated_at = Some(now);
    }

    /// Whether the name carries the protagonist marker.
    pub fn is_protagonist(&self, marker: &str) -> bool {
        !marker.is_empty() && self.name.contains(marker)
    }

    /// Fold a freshly generated profile for the same character into this one.
    ///
    /// Descriptive attributes are replaced, history only grows, and the
    /// creation time is kept from whichever side already had one.
    pub fn absorb(&mut self, incoming: CharacterProfile, now: DateTime<Utc>) {
        let CharacterProfile {
            age,
            gender,
            appearance,
            identity,
            personality,
            motivation,
            background,
            growth_arc,
            abilities,
            weaknesses,
            relationships,
            development_history,
            importance,
            last_appearance,
            created_at,
            ..
        } = incoming;

        self.age = age;
        self.gender = gender;
        self.appearance = appearance;
        self.identity = identity;
        self.personality = personality;
        self.motivation = motivation;
        self.background = background;
        self.growth_arc = growth_arc;
        self.abilities = abilities;
        self.weaknesses = weaknesses;
        self.importance = importance.clamp(1, 10);
        self.relationships.extend(relationships);

        for note in development_history {
            if !self.development_history.contains(&note) {
                self.development_history.push(note);
            }
        }

        self.last_appearance = match (self.last_appearance, last_appearance) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.created_at = self.created_at.or(created_at).or(Some(now));
        self.updated_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_defaults() {
        let profile: CharacterProfile = serde_json::from_str(r#"{"name": "林风"}"#).unwrap();
        assert_eq!(profile.importance, DEFAULT_IMPORTANCE);
        assert!(profile.development_history.is_empty());
        assert!(profile.last_appearance.is_none());
        assert!(profile.created_at.is_none());
    }

    #[test]
    fn test_record_development() {
        let now = Utc::now();
        let mut profile = CharacterProfile::new("林风");
        profile.record_development(3, "突破筑基", now);

        assert_eq!(profile.last_appearance, Some(3));
        assert_eq!(profile.latest_development().unwrap().development, "突破筑基");
        assert_eq!(profile.updated_at, Some(now));
    }

    #[test]
    fn test_protagonist_marker() {
        assert!(CharacterProfile::new("主角林风").is_protagonist("主角"));
        assert!(!CharacterProfile::new("林风").is_protagonist("主角"));
        assert!(!CharacterProfile::new("林风").is_protagonist(""));
    }

    #[test]
    fn test_apply_partial_update() {
        let now = Utc::now();
        let mut profile = CharacterProfile::new("林风")
            .with_identity("山村少年")
            .with_personality("沉默");
        profile.record_development(1, "下山", now);

        let later = now + chrono::Duration::seconds(3);
        profile.apply(
            CharacterUpdate::new().with_personality("果断").with_importance(42),
            later,
        );

        assert_eq!(profile.personality, "果断");
        assert_eq!(profile.identity, "山村少年");
        assert_eq!(profile.importance, 10);
        assert_eq!(profile.development_history.len(), 1);
        assert_eq!(profile.updated_at, Some(later));
    }

    #[test]
    fn test_update_from_json_leaves_missing_fields() {
        let update: CharacterUpdate = serde_json::from_str(r#"{"motivation": "复仇"}"#).unwrap();
        assert_eq!(update, CharacterUpdate::new().with_motivation("复仇"));
    }

    #[test]
    fn test_absorb_keeps_history_and_creation() {
        let first = Utc::now();
        let mut existing = CharacterProfile::new("林风").with_personality("沉默");
        existing.created_at = Some(first);
        existing.record_development(2, "离开山村", first);

        let later = first + chrono::Duration::seconds(5);
        let incoming = CharacterProfile::new("林风")
            .with_personality("果断")
            .with_importance(9);
        existing.absorb(incoming, later);

        assert_eq!(existing.personality, "果断");
        assert_eq!(existing.importance, 9);
        assert_eq!(existing.development_history.len(), 1);
        assert_eq!(existing.last_appearance, Some(2));
        assert_eq!(existing.created_at, Some(first));
        assert_eq!(existing.updated_at, Some(later));
    }
}
