//! Plot threads spanning one or more chapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// End chapter of a thread that has not been closed.
pub const OPEN_END: u32 = 9999;

fn open_end() -> u32 {
    OPEN_END
}

/// Whether a thread is still unfolding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PlotStatus {
    #[default]
    #[serde(rename = "进行中")]
    InProgress,
    #[serde(rename = "已解决")]
    Resolved,
}

impl PlotStatus {
    /// Display label.
    pub fn label(&self) -> &'static str {
        match self {
            PlotStatus::InProgress => "进行中",
            PlotStatus::Resolved => "已解决",
        }
    }
}

/// A tracked narrative arc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotThread {
    pub name: String,
    pub start_chapter: u32,
    #[serde(default = "open_end")]
    pub end_chapter: u32,
    /// Fragments matched against later key events.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Chapters that touched this thread, in the order they were folded in.
    #[serde(default)]
    pub chapters: Vec<u32>,
    #[serde(default)]
    pub status: PlotStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl PlotThread {
    /// A thread opened by `chapter`, keyed on its first key events.
    pub fn opened(
        name: impl Into<String>,
        chapter: u32,
        keywords: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            start_chapter: chapter,
            end_chapter: chapter,
            keywords,
            chapters: vec![chapter],
            status: PlotStatus::InProgress,
            created_at: Some(now),
            last_updated: None,
        }
    }

    /// Whether any keyword occurs inside any of the events.
    pub fn matches(&self, events: &[String]) -> bool {
        self.keywords
            .iter()
            .filter(|k| !k.is_empty())
            .any(|k| events.iter().any(|e| e.contains(k.as_str())))
    }

    /// Extend the thread with another chapter.
    pub fn fold(&mut self, chapter: u32, now: DateTime<Utc>) {
        self.chapters.push(chapter);
        if self.end_chapter < chapter {
            self.end_chapter = chapter;
        }
        self.last_updated = Some(now);
    }

    /// Close the thread at `chapter`.
    pub fn resolve(&mut self, chapter: u32, now: DateTime<Utc>) {
        self.end_chapter = chapter;
        self.status = PlotStatus::Resolved;
        self.last_updated = Some(now);
    }

    pub fn is_active_at(&self, chapter: u32) -> bool {
        self.start_chapter <= chapter && chapter <= self.end_chapter
    }
}
