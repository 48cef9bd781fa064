//! The in-memory aggregate of every established story fact.

use super::chapter::{ChapterSummary, TimelineEvent};
use super::character::{CharacterProfile, CharacterUpdate};
use super::location::Location;
use super::plot::PlotThread;
use super::relationship::{CharacterPair, RelationshipGraph};
use super::world::{CoreSettings, WorldView};
use crate::plan::{ChapterPlan, Outline};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Core settings key holding the outline.
pub const OUTLINE_KEY: &str = "outline";

/// Core settings key holding the chapter plan.
pub const CHAPTER_PLAN_KEY: &str = "chapter_plan";

/// Outcome of folding a chapter's key events into the plot threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlotUpdate {
    /// No key events, or too few to open a thread.
    Untouched,
    /// The chapter extended an existing thread.
    Folded(String),
    /// The chapter opened a new thread.
    Opened(String),
}

/// Every story fact of one project.
///
/// Pure data plus mutation rules; durability is handled by
/// [`crate::persist::MemoryDir`] and shared access by
/// [`crate::fact_store::FactStore`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NovelMemory {
    pub(crate) core_settings: CoreSettings,
    pub(crate) characters: BTreeMap<String, CharacterProfile>,
    pub(crate) worldview: WorldView,
    pub(crate) chapter_summaries: BTreeMap<u32, ChapterSummary>,
    pub(crate) timeline: Vec<TimelineEvent>,
    pub(crate) plots: Vec<PlotThread>,
    pub(crate) locations: BTreeMap<String, Location>,
    pub(crate) relationships: RelationshipGraph,
}

impl NovelMemory {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Core Settings
    // =========================================================================

    pub fn core_settings(&self) -> &CoreSettings {
        &self.core_settings
    }

    /// Amend core settings; existing keys are overwritten.
    pub fn update_core_settings(&mut self, entries: impl IntoIterator<Item = (String, Value)>) {
        self.core_settings.extend(entries);
    }

    /// The stored outline, if one was recorded and still parses.
    pub fn outline(&self) -> Option<Outline> {
        let value = self.core_settings.get(OUTLINE_KEY)?;
        match serde_json::from_value(value.clone()) {
            Ok(outline) => Some(outline),
            Err(e) => {
                warn!(error = %e, "stored outline does not parse");
                None
            }
        }
    }

    /// The stored chapter plan, synced with the chapters written so far.
    pub fn chapter_plan(&self) -> Option<ChapterPlan> {
        let value = self.core_settings.get(CHAPTER_PLAN_KEY)?;
        let mut plan: ChapterPlan = serde_json::from_value(value.clone()).ok()?;
        plan.sync_with(&self.chapter_summaries);
        Some(plan)
    }

    // =========================================================================
    // Characters
    // =========================================================================

    pub fn character(&self, name: &str) -> Option<&CharacterProfile> {
        self.characters.get(name)
    }

    /// All characters, ordered by name.
    pub fn characters(&self) -> impl Iterator<Item = &CharacterProfile> {
        self.characters.values()
    }

    pub fn character_names(&self) -> impl Iterator<Item = &str> {
        self.characters.keys().map(String::as_str)
    }

    pub fn character_count(&self) -> usize {
        self.characters.len()
    }

    /// Upsert profiles by name.
    pub fn merge_characters(
        &mut self,
        incoming: impl IntoIterator<Item = CharacterProfile>,
        now: DateTime<Utc>,
    ) {
        for mut profile in incoming {
            let name = profile.name.trim().to_string();
            if name.is_empty() {
                warn!("skipping character profile without a name");
                continue;
            }
            match self.characters.get_mut(&name) {
                Some(existing) => existing.absorb(profile, now),
                None => {
                    profile.name = name.clone();
                    profile.importance = profile.importance.clamp(1, 10);
                    profile.created_at = profile.created_at.or(Some(now));
                    profile.updated_at = Some(now);
                    self.characters.insert(name, profile);
                }
            }
        }
    }

    /// Edit some attributes of a known character.
    ///
    /// Returns `false` when no character has that name.
    pub fn update_character(&mut self, name: &str, update: CharacterUpdate, now: DateTime<Utc>) -> bool {
        match self.characters.get_mut(name) {
            Some(profile) => {
                profile.apply(update, now);
                true
            }
            None => false,
        }
    }

    /// Record how `from` relates to `to`, overwriting any earlier relation.
    ///
    /// Both characters must be known; otherwise nothing changes and `false`
    /// is returned.
    pub fn add_relationship(&mut self, from: &str, to: &str, relation: &str, now: DateTime<Utc>) -> bool {
        if from == to || !self.characters.contains_key(to) {
            return false;
        }
        match self.characters.get_mut(from) {
            Some(profile) => {
                profile.relationships.insert(to.to_string(), relation.to_string());
                profile.updated_at = Some(now);
                debug!(from, to, relation, "relationship recorded");
                true
            }
            None => false,
        }
    }

    /// Append a development note to a known character.
    ///
    /// Returns `false` when no character has that name.
    pub fn record_development(
        &mut self,
        name: &str,
        chapter: u32,
        note: &str,
        now: DateTime<Utc>,
    ) -> bool {
        match self.characters.get_mut(name) {
            Some(profile) => {
                profile.record_development(chapter, note, now);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // World View
    // =========================================================================

    pub fn worldview(&self) -> &WorldView {
        &self.worldview
    }

    /// Replace the world view wholesale.
    pub fn merge_worldview(&mut self, mut worldview: WorldView, now: DateTime<Utc>) {
        worldview.updated_at = Some(now);
        self.worldview = worldview;
    }

    // =========================================================================
    // Chapters and Timeline
    // =========================================================================

    pub fn chapter_summaries(&self) -> &BTreeMap<u32, ChapterSummary> {
        &self.chapter_summaries
    }

    pub fn chapter_summary(&self, chapter: u32) -> Option<&ChapterSummary> {
        self.chapter_summaries.get(&chapter)
    }

    /// Store a summary, replacing any previous one for the same chapter.
    ///
    /// Returns `true` if a previous record was replaced.
    pub fn record_summary(&mut self, summary: ChapterSummary) -> bool {
        self.chapter_summaries
            .insert(summary.chapter_number, summary)
            .is_some()
    }

    /// Summaries of chapters `max(1, before - window)..before` that exist.
    pub fn recent_summaries(&self, before: u32, window: u32) -> Vec<&ChapterSummary> {
        let start = before.saturating_sub(window).max(1);
        self.chapter_summaries.range(start..before).map(|(_, s)| s).collect()
    }

    /// Timeline in insertion order.
    pub fn timeline(&self) -> &[TimelineEvent] {
        &self.timeline
    }

    pub fn push_event(&mut self, event: TimelineEvent) {
        self.timeline.push(event);
    }

    /// Timeline sorted by chapter; ties keep insertion order.
    pub fn timeline_sorted(&self) -> Vec<&TimelineEvent> {
        let mut events: Vec<&TimelineEvent> = self.timeline.iter().collect();
        events.sort_by_key(|e| e.chapter);
        events
    }

    // =========================================================================
    // Locations
    // =========================================================================

    pub fn locations(&self) -> &BTreeMap<String, Location> {
        &self.locations
    }

    /// Record a location mention. Returns `true` if the location is new.
    pub fn note_location(&mut self, name: &str, chapter: u32, now: DateTime<Utc>) -> bool {
        match self.locations.get_mut(name) {
            Some(location) => {
                location.touch(chapter);
                false
            }
            None => {
                self.locations
                    .insert(name.to_string(), Location::discovered(name, chapter, now));
                true
            }
        }
    }

    // =========================================================================
    // Plot Threads
    // =========================================================================

    pub fn plots(&self) -> &[PlotThread] {
        &self.plots
    }

    /// Threads active at `chapter`, in stored order.
    pub fn active_plots(&self, chapter: u32) -> impl Iterator<Item = &PlotThread> {
        self.plots.iter().filter(move |p| p.is_active_at(chapter))
    }

    /// Fold a chapter's key events into the first matching thread, or open
    /// a new thread when nothing matches and there are at least two events.
    pub fn fold_into_plots(
        &mut self,
        chapter: u32,
        key_events: &[String],
        now: DateTime<Utc>,
    ) -> PlotUpdate {
        if key_events.is_empty() {
            return PlotUpdate::Untouched;
        }

        if let Some(thread) = self.plots.iter_mut().find(|p| p.matches(key_events)) {
            thread.fold(chapter, now);
            debug!(chapter, thread = %thread.name, "chapter folded into plot thread");
            return PlotUpdate::Folded(thread.name.clone());
        }

        if key_events.len() < 2 {
            return PlotUpdate::Untouched;
        }

        let name = format!("情节线_{}", self.plots.len() + 1);
        let keywords = key_events.iter().take(3).cloned().collect();
        self.plots
            .push(PlotThread::opened(name.clone(), chapter, keywords, now));
        debug!(chapter, thread = %name, "opened plot thread");
        PlotUpdate::Opened(name)
    }

    /// Mark a thread resolved at `chapter`. Returns `false` if no thread has that name.
    pub fn resolve_plot_thread(&mut self, name: &str, chapter: u32, now: DateTime<Utc>) -> bool {
        match self.plots.iter_mut().find(|p| p.name == name) {
            Some(thread) => {
                thread.resolve(chapter, now);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Relationships
    // =========================================================================

    pub fn relationships(&self) -> &RelationshipGraph {
        &self.relationships
    }

    pub fn record_interaction(&mut self, pair: CharacterPair, chapter: u32) {
        self.relationships.record(pair, chapter);
    }

    // =========================================================================
    // Whole Store
    // =========================================================================

    /// Drop every fact.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Latest chapter with a summary.
    pub fn latest_chapter(&self) -> Option<u32> {
        self.chapter_summaries.keys().next_back().copied()
    }
}
