//! Chapter summaries and timeline events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The recorded digest of one generated chapter.
///
/// Written once per chapter by extraction; regenerating the chapter
/// replaces the record entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub chapter_number: u32,
    pub summary: String,
    /// Length of the chapter content in characters.
    #[serde(default)]
    pub word_count: usize,
    #[serde(default)]
    pub key_events: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Kind of timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventKind {
    /// A key event extracted from chapter text.
    ChapterEvent,
    #[serde(other)]
    Other,
}

/// An event on the story timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub chapter: u32,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: TimelineEventKind,
}

fn default_kind() -> TimelineEventKind {
    TimelineEventKind::ChapterEvent
}

impl TimelineEvent {
    /// A key event extracted from a chapter.
    pub fn chapter_event(chapter: u32, description: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            chapter,
            description: description.into(),
            timestamp: now,
            kind: TimelineEventKind::ChapterEvent,
        }
    }
}
