//! Locations discovered in chapter text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A place mentioned in the story, keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub first_appearance: u32,
    pub last_appearance: u32,
    #[serde(default)]
    pub appearance_count: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Location {
    /// A location seen for the first time in `chapter`.
    pub fn discovered(name: impl Into<String>, chapter: u32, now: DateTime<Utc>) -> Self {
        let name = name.into();
        let description = format!("在{name}发生的事件");
        Self {
            name,
            first_appearance: chapter,
            last_appearance: chapter,
            appearance_count: 1,
            description,
            created_at: Some(now),
        }
    }

    /// Record another mention.
    pub fn touch(&mut self, chapter: u32) {
        self.last_appearance = chapter;
        self.appearance_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_lifecycle() {
        let mut location = Location::discovered("青云山", 2, Utc::now());
        assert_eq!(location.appearance_count, 1);
        assert_eq!(location.description, "在青云山发生的事件");

        location.touch(5);
        assert_eq!(location.first_appearance, 2);
        assert_eq!(location.last_appearance, 5);
        assert_eq!(location.appearance_count, 2);
    }
}
