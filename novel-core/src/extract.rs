//! Extraction and update pipeline: folds a finished chapter into the memory.
//!
//! Location and relationship discovery go through the [`FactExtractor`]
//! trait. The shipped [`HeuristicExtractor`] uses fixed surface patterns and
//! character-distance proximity; expect false positives.

use crate::memory::{
    lenient, ChapterSummary, CharacterPair, NovelMemory, PlotUpdate, TimelineEvent,
};
use crate::text::{char_position, truncate_chars};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Characters kept when a summary has to be derived from the content.
pub const DERIVED_SUMMARY_CHARS: usize = 200;

/// Two names closer than this many characters count as an interaction.
pub const DEFAULT_PROXIMITY: usize = 500;

lazy_static! {
    static ref LOCATION_PATTERNS: Vec<Regex> = ["在", "来到", "抵达", "位于"]
        .iter()
        .map(|prefix| Regex::new(&format!(r"{prefix}([\x{{4E00}}-\x{{9FA5}}]{{2,6}})")).expect("static pattern"))
        .collect();
}

/// Turns raw chapter text into candidate facts.
pub trait FactExtractor: Send + Sync {
    /// Candidate location names mentioned in the text.
    fn locations(&self, content: &str) -> Vec<String>;

    /// Pairs of known characters that interact in the text.
    fn interactions(&self, content: &str, names: &[&str]) -> Vec<CharacterPair>;
}

/// Pattern and proximity based extraction.
#[derive(Debug, Clone)]
pub struct HeuristicExtractor {
    proximity: usize,
}

impl Default for HeuristicExtractor {
    fn default() -> Self {
        Self {
            proximity: DEFAULT_PROXIMITY,
        }
    }
}

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_proximity(mut self, proximity: usize) -> Self {
        self.proximity = proximity;
        self
    }
}

impl FactExtractor for HeuristicExtractor {
    fn locations(&self, content: &str) -> Vec<String> {
        let mut found = BTreeSet::new();
        for pattern in LOCATION_PATTERNS.iter() {
            for captures in pattern.captures_iter(content) {
                if let Some(name) = captures.get(1) {
                    if name.as_str().chars().count() >= 2 {
                        found.insert(name.as_str().to_string());
                    }
                }
            }
        }
        found.into_iter().collect()
    }

    fn interactions(&self, content: &str, names: &[&str]) -> Vec<CharacterPair> {
        let positions: Vec<(&str, usize)> = names
            .iter()
            .filter_map(|name| char_position(content, name).map(|pos| (*name, pos)))
            .collect();

        let mut pairs = Vec::new();
        for (i, (a, pos_a)) in positions.iter().enumerate() {
            for (b, pos_b) in &positions[i + 1..] {
                if a != b && pos_a.abs_diff(*pos_b) < self.proximity {
                    pairs.push(CharacterPair::new(*a, *b));
                }
            }
        }
        pairs
    }
}

/// A finished chapter as returned by the generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterDraft {
    #[serde(default, deserialize_with = "lenient::text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub content: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub key_events: Vec<String>,
    /// Character name to what changed for them.
    #[serde(default, deserialize_with = "lenient::string_map")]
    pub character_development: BTreeMap<String, String>,
}

impl ChapterDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_key_events(mut self, events: Vec<String>) -> Self {
        self.key_events = events;
        self
    }

    pub fn with_development(mut self, name: impl Into<String>, note: impl Into<String>) -> Self {
        self.character_development.insert(name.into(), note.into());
        self
    }

    /// Length of the content in characters.
    pub fn word_count(&self) -> usize {
        self.content.chars().count()
    }

    /// The provided summary as given, or the content cut to 200 characters.
    pub fn effective_summary(&self) -> String {
        match self.summary.as_deref() {
            Some(summary) if !summary.trim().is_empty() => summary.to_string(),
            _ => truncate_chars(&self.content, DERIVED_SUMMARY_CHARS),
        }
    }
}

/// What one chapter changed in the memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionReport {
    pub chapter: u32,
    /// A summary for this chapter already existed and was overwritten.
    pub summary_replaced: bool,
    /// Characters that received a development note.
    pub developments: Vec<String>,
    /// Names in the development map that match no known character.
    pub unknown_characters: Vec<String>,
    pub timeline_events: usize,
    pub new_locations: Vec<String>,
    pub revisited_locations: Vec<String>,
    pub plot: PlotUpdate,
    pub interactions: Vec<CharacterPair>,
}

/// Apply a finished chapter to the memory.
///
/// Processing the same chapter twice overwrites its summary but appends
/// development notes and timeline events again.
pub fn apply_chapter(
    memory: &mut NovelMemory,
    chapter: u32,
    draft: &ChapterDraft,
    extractor: &dyn FactExtractor,
    now: DateTime<Utc>,
) -> ExtractionReport {
    let summary_replaced = memory.record_summary(ChapterSummary {
        chapter_number: chapter,
        summary: draft.effective_summary(),
        word_count: draft.word_count(),
        key_events: draft.key_events.clone(),
        timestamp: now,
    });

    let mut developments = Vec::new();
    let mut unknown_characters = Vec::new();
    for (name, note) in &draft.character_development {
        if memory.record_development(name, chapter, note, now) {
            developments.push(name.clone());
        } else {
            warn!(chapter, character = %name, "dropping development note for unknown character");
            unknown_characters.push(name.clone());
        }
    }

    for event in &draft.key_events {
        memory.push_event(TimelineEvent::chapter_event(chapter, event.clone(), now));
    }

    let mut new_locations = Vec::new();
    let mut revisited_locations = Vec::new();
    for name in extractor.locations(&draft.content) {
        if name.chars().count() < 2 {
            continue;
        }
        if memory.note_location(&name, chapter, now) {
            new_locations.push(name);
        } else {
            revisited_locations.push(name);
        }
    }

    let plot = memory.fold_into_plots(chapter, &draft.key_events, now);

    let names: Vec<String> = memory.character_names().map(str::to_string).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let interactions = extractor.interactions(&draft.content, &name_refs);
    for pair in &interactions {
        memory.record_interaction(pair.clone(), chapter);
    }

    debug!(
        chapter,
        summary = %truncate_chars(&draft.effective_summary(), 30),
        developments = developments.len(),
        new_locations = new_locations.len(),
        interactions = interactions.len(),
        "applied chapter to memory"
    );

    ExtractionReport {
        chapter,
        summary_replaced,
        developments,
        unknown_characters,
        timeline_events: draft.key_events.len(),
        new_locations,
        revisited_locations,
        plot,
        interactions,
    }
}
