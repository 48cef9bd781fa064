//! Outlines and chapter plans.
//!
//! The chapter plan is always derived here from the target length. An
//! `estimated_chapters` value returned with a generated outline is kept for
//! display only.

use crate::memory::{lenient, ChapterSummary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default target length of one chapter, in characters.
pub const DEFAULT_CHAPTER_WORDS: u32 = 3000;

/// Fewest chapters a plan ever has.
pub const MIN_PLANNED_CHAPTERS: u32 = 10;

/// A generated story outline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    #[serde(default, deserialize_with = "lenient::text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub theme: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub summary: String,
    #[serde(default, deserialize_with = "lenient::count")]
    pub target_words: u32,
    #[serde(default, deserialize_with = "lenient::count")]
    pub estimated_chapters: u32,
    /// Act name to its description.
    #[serde(default, deserialize_with = "lenient::string_map")]
    pub structure: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub key_plot_points: Vec<String>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub main_characters: Vec<String>,
}

/// The three-act position of a chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Act {
    #[serde(rename = "第一幕：开端")]
    Opening,
    #[serde(rename = "第二幕：发展")]
    Development,
    #[serde(rename = "第三幕：高潮与结局")]
    Climax,
}

impl Act {
    /// Act of the zero-based chapter `index` in a plan of `total` chapters:
    /// the first 30% open, up to 70% develop, the rest climax.
    pub fn at(index: u32, total: u32) -> Self {
        let (index, total) = (u64::from(index) * 10, u64::from(total));
        if index < total * 3 {
            Act::Opening
        } else if index < total * 7 {
            Act::Development
        } else {
            Act::Climax
        }
    }
}

/// Whether a planned chapter has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Pending,
    Completed,
}

/// One chapter of the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub chapter: u32,
    pub act: Act,
    pub target_words: u32,
    #[serde(default)]
    pub status: PlanStatus,
    #[serde(default)]
    pub summary_preview: Option<String>,
}

/// The full chapter plan of a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterPlan {
    entries: Vec<PlanEntry>,
}

impl ChapterPlan {
    /// Plan `max(10, target_words / chapter_words)` chapters split 30/40/30 into acts.
    pub fn from_target(target_words: u32, chapter_words: u32) -> Self {
        let chapter_words = chapter_words.max(1);
        let total = (target_words / chapter_words).max(MIN_PLANNED_CHAPTERS);

        let entries = (0..total)
            .map(|i| PlanEntry {
                chapter: i + 1,
                act: Act::at(i, total),
                target_words: chapter_words,
                status: PlanStatus::Pending,
                summary_preview: None,
            })
            .collect();

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn entry(&self, chapter: u32) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.chapter == chapter)
    }

    /// Mark entries completed where a summary exists.
    pub fn sync_with(&mut self, summaries: &BTreeMap<u32, ChapterSummary>) {
        for entry in &mut self.entries {
            match summaries.get(&entry.chapter) {
                Some(summary) => {
                    entry.status = PlanStatus::Completed;
                    entry.summary_preview = Some(crate::text::truncate_chars(&summary.summary, 100));
                }
                None => {
                    entry.status = PlanStatus::Pending;
                    entry.summary_preview = None;
                }
            }
        }
    }

    /// Chapters not yet written, in order.
    pub fn pending(&self) -> Vec<u32> {
        self.entries
            .iter()
            .filter(|e| e.status == PlanStatus::Pending)
            .map(|e| e.chapter)
            .collect()
    }

    /// Number of completed chapters.
    pub fn completed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == PlanStatus::Completed)
            .count()
    }
}
