//! Relevance engine: which stored facts are in scope for a chapter.
//!
//! Selection is deterministic for a given memory state and chapter number.
//! The only variety between chapters comes from a stable md5 hash of
//! `(key, chapter)`, never from a random number generator.

use crate::memory::{CharacterProfile, NovelMemory, TimelineEvent};
use serde::Serialize;
use tracing::debug;

/// Names containing this marker are always in scope.
pub const PROTAGONIST_MARKER: &str = "主角";

/// Why a character was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Inclusion {
    /// Protagonist or high importance; included unconditionally.
    Anchor,
    /// Important enough to appear in the opening chapters.
    Opening,
    /// Passed the score or importance threshold.
    Scored,
}

/// A selected character with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCharacter {
    pub name: String,
    pub score: f64,
    pub inclusion: Inclusion,
}

/// Everything selected for one chapter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selection {
    pub chapter: u32,
    pub characters: Vec<ScoredCharacter>,
    pub locations: Vec<String>,
    /// Names of active plot threads, in stored order.
    pub plots: Vec<String>,
    /// Events up to the chapter, oldest first.
    pub timeline: Vec<TimelineEvent>,
}

impl Selection {
    pub fn character_names(&self) -> impl Iterator<Item = &str> {
        self.characters.iter().map(|c| c.name.as_str())
    }
}

/// Thresholds and caps for selection.
#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceConfig {
    pub protagonist_marker: String,
    pub anchor_importance: u8,
    pub opening_chapters: u32,
    pub opening_importance: u8,
    pub opening_cap: usize,
    pub include_score: f64,
    pub include_importance: u8,
    pub character_cap: usize,
    pub location_cap: usize,
    pub plot_cap: usize,
    pub timeline_cap: usize,
    /// How many preceding chapter summaries count toward mentions.
    pub mention_window: u32,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            protagonist_marker: PROTAGONIST_MARKER.to_string(),
            anchor_importance: 8,
            opening_chapters: 3,
            opening_importance: 6,
            opening_cap: 5,
            include_score: 0.3,
            include_importance: 7,
            character_cap: 8,
            location_cap: 5,
            plot_cap: 5,
            timeline_cap: 10,
            mention_window: 5,
        }
    }
}

impl RelevanceConfig {
    pub fn with_protagonist_marker(mut self, marker: impl Into<String>) -> Self {
        self.protagonist_marker = marker.into();
        self
    }

    pub fn with_character_cap(mut self, cap: usize) -> Self {
        self.character_cap = cap;
        self
    }

    pub fn with_location_cap(mut self, cap: usize) -> Self {
        self.location_cap = cap;
        self
    }
}

/// Stable hash of `(key, chapter)`, identical across runs and platforms.
pub fn stable_hash(key: &str, chapter: u32) -> u128 {
    let digest = md5::compute(format!("{key}_{chapter}"));
    u128::from_be_bytes(digest.0)
}

/// Per-chapter variety term in `[0, 0.2)`.
pub fn jitter(key: &str, chapter: u32) -> f64 {
    (stable_hash(key, chapter) % 100) as f64 / 100.0 * 0.2
}

/// Picks the characters, locations, plot threads and timeline events for a chapter.
#[derive(Debug, Clone, Default)]
pub struct RelevanceEngine {
    config: RelevanceConfig,
}

impl RelevanceEngine {
    pub fn new(config: RelevanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RelevanceConfig {
        &self.config
    }

    pub fn select(&self, memory: &NovelMemory, chapter: u32) -> Selection {
        let selection = Selection {
            chapter,
            characters: self.select_characters(memory, chapter),
            locations: self.select_locations(memory, chapter),
            plots: memory
                .active_plots(chapter)
                .take(self.config.plot_cap)
                .map(|p| p.name.clone())
                .collect(),
            timeline: self.select_timeline(memory, chapter),
        };

        debug!(
            chapter,
            characters = ?selection.character_names().collect::<Vec<_>>(),
            locations = ?selection.locations,
            plots = selection.plots.len(),
            "relevance selection"
        );
        selection
    }

    /// Relevance of one character to a chapter, in `[0, 1]`.
    pub fn character_score(
        &self,
        memory: &NovelMemory,
        profile: &CharacterProfile,
        chapter: u32,
    ) -> f64 {
        let importance = f64::from(profile.importance) * 0.05;

        let recency = match profile.last_appearance {
            Some(last) => {
                let gap = i64::from(chapter) - i64::from(last);
                if gap <= 3 {
                    0.3
                } else if gap <= 10 {
                    0.1
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        let development = (profile.development_history.len() as f64 * 0.02).min(0.2);

        let mentions = memory
            .recent_summaries(chapter, self.config.mention_window)
            .iter()
            .filter(|s| s.summary.contains(&profile.name))
            .count();
        let mentions = (mentions as f64 * 0.05).min(0.2);

        (importance + recency + development + mentions + jitter(&profile.name, chapter)).min(1.0)
    }

    fn is_anchor(&self, profile: &CharacterProfile) -> bool {
        profile.is_protagonist(&self.config.protagonist_marker)
            || profile.importance >= self.config.anchor_importance
    }

    fn select_characters(&self, memory: &NovelMemory, chapter: u32) -> Vec<ScoredCharacter> {
        let mut candidates: Vec<&CharacterProfile> = memory.characters().collect();
        candidates.sort_by(|a, b| b.importance.cmp(&a.importance).then_with(|| a.name.cmp(&b.name)));

        let opening = chapter <= self.config.opening_chapters;
        let cap = if opening {
            self.config.opening_cap
        } else {
            self.config.character_cap
        };

        let mut selected = Vec::new();
        for profile in candidates {
            let score = self.character_score(memory, profile, chapter);
            let inclusion = if self.is_anchor(profile) {
                Some(Inclusion::Anchor)
            } else if selected.len() >= cap {
                None
            } else if opening {
                (profile.importance >= self.config.opening_importance).then_some(Inclusion::Opening)
            } else {
                (score >= self.config.include_score
                    || profile.importance >= self.config.include_importance)
                    .then_some(Inclusion::Scored)
            };

            if let Some(inclusion) = inclusion {
                selected.push(ScoredCharacter {
                    name: profile.name.clone(),
                    score,
                    inclusion,
                });
            }
        }
        selected
    }

    fn select_locations(&self, memory: &NovelMemory, chapter: u32) -> Vec<String> {
        memory
            .locations()
            .keys()
            .filter(|name| stable_hash(name, chapter) % 3 == 0)
            .take(self.config.location_cap)
            .cloned()
            .collect()
    }

    fn select_timeline(&self, memory: &NovelMemory, chapter: u32) -> Vec<TimelineEvent> {
        let events: Vec<&TimelineEvent> = memory
            .timeline_sorted()
            .into_iter()
            .filter(|e| e.chapter <= chapter)
            .collect();
        let skip = events.len().saturating_sub(self.config.timeline_cap);
        events.into_iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ChapterSummary;
    use chrono::Utc;

    fn memory_with(characters: Vec<CharacterProfile>) -> NovelMemory {
        let mut memory = NovelMemory::new();
        memory.merge_characters(characters, Utc::now());
        memory
    }

    #[test]
    fn test_stable_hash_is_stable() {
        assert_eq!(stable_hash("林风", 4), stable_hash("林风", 4));
        assert_ne!(stable_hash("林风", 4), stable_hash("林风", 5));
    }

    #[test]
    fn test_opening_chapter_anchor_only() {
        let memory = memory_with(vec![
            CharacterProfile::new("主角").with_importance(10),
            CharacterProfile::new("配角").with_importance(4),
        ]);
        let selection = RelevanceEngine::default().select(&memory, 1);
        let names: Vec<&str> = selection.character_names().collect();
        assert_eq!(names, vec!["主角"]);
        assert_eq!(selection.characters[0].inclusion, Inclusion::Anchor);
    }

    #[test]
    fn test_opening_cap_counts_anchors() {
        let mut characters = vec![CharacterProfile::new("主角").with_importance(9)];
        for name in ["甲", "乙", "丙", "丁", "戊", "己"] {
            characters.push(CharacterProfile::new(name).with_importance(6));
        }
        let memory = memory_with(characters);
        let selection = RelevanceEngine::default().select(&memory, 2);
        assert_eq!(selection.characters.len(), 5);
        assert_eq!(selection.characters[0].name, "主角");
    }

    #[test]
    fn test_later_chapters_include_important_characters() {
        let mut characters = Vec::new();
        for (i, name) in ["甲", "乙", "丙", "丁", "戊", "己", "庚", "辛", "壬", "癸"].iter().enumerate() {
            characters.push(CharacterProfile::new(*name).with_importance(if i < 2 { 9 } else { 7 }));
        }
        let memory = memory_with(characters);
        let selection = RelevanceEngine::default().select(&memory, 20);
        assert_eq!(selection.characters.len(), 8);
        assert!(selection
            .characters
            .iter()
            .take(2)
            .all(|c| c.inclusion == Inclusion::Anchor));
    }

    #[test]
    fn test_scores_are_bounded_and_deterministic() {
        let now = Utc::now();
        let mut memory = memory_with(vec![
            CharacterProfile::new("林风").with_importance(10).with_last_appearance(9),
            CharacterProfile::new("路人").with_importance(1),
        ]);
        for n in 5..10 {
            memory.record_summary(summary(n, "林风赶路"));
            memory.record_development("林风", n, "成长", now);
        }

        let engine = RelevanceEngine::default();
        let first = engine.select(&memory, 10);
        let second = engine.select(&memory, 10);
        assert_eq!(first, second);

        for profile in memory.characters() {
            let score = engine.character_score(&memory, profile, 10);
            assert!((0.0..=1.0).contains(&score));
        }
        let lin = memory.character("林风").unwrap();
        assert!((engine.character_score(&memory, lin, 10) - 1.0).abs() < f64::EPSILON);
    }

    fn summary(chapter: u32, text: &str) -> ChapterSummary {
        ChapterSummary {
            chapter_number: chapter,
            summary: text.to_string(),
            word_count: text.chars().count(),
            key_events: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    fn score_of(memory: &NovelMemory, name: &str, chapter: u32) -> f64 {
        let profile = memory.character(name).unwrap();
        RelevanceEngine::default().character_score(memory, profile, chapter)
    }

    fn assert_score(memory: &NovelMemory, name: &str, chapter: u32, expected_terms: f64) {
        let expected = expected_terms + jitter(name, chapter);
        let actual = score_of(memory, name, chapter);
        assert!(
            (actual - expected).abs() < 1e-9,
            "{name} at chapter {chapter}: expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_jitter_range() {
        for chapter in 1..200 {
            let value = jitter("林风", chapter);
            assert!((0.0..0.2).contains(&value));
        }
    }

    #[test]
    fn test_recency_band_edges() {
        let memory = memory_with(vec![
            CharacterProfile::new("近三").with_importance(2).with_last_appearance(17),
            CharacterProfile::new("隔四").with_importance(2).with_last_appearance(16),
            CharacterProfile::new("隔十").with_importance(2).with_last_appearance(10),
            CharacterProfile::new("十一").with_importance(2).with_last_appearance(9),
            CharacterProfile::new("未出场").with_importance(2),
        ]);

        assert_score(&memory, "近三", 20, 0.1 + 0.3);
        assert_score(&memory, "隔四", 20, 0.1 + 0.1);
        assert_score(&memory, "隔十", 20, 0.1 + 0.1);
        assert_score(&memory, "十一", 20, 0.1);
        assert_score(&memory, "未出场", 20, 0.1);
    }

    #[test]
    fn test_development_term_and_cap() {
        let now = Utc::now();
        let mut few = CharacterProfile::new("三笔").with_importance(2);
        let mut many = CharacterProfile::new("多笔").with_importance(2);
        for n in 1..=3 {
            few.record_development(n, "成长", now);
        }
        for n in 1..=15 {
            many.record_development(n, "成长", now);
        }
        few.last_appearance = None;
        many.last_appearance = None;
        let memory = memory_with(vec![few, many]);

        assert_score(&memory, "三笔", 40, 0.1 + 0.06);
        assert_score(&memory, "多笔", 40, 0.1 + 0.2);
    }

    #[test]
    fn test_mentions_only_count_recent_window() {
        let mut memory = memory_with(vec![CharacterProfile::new("苏雪").with_importance(2)]);
        memory.record_summary(summary(14, "苏雪离山"));
        for n in 15..=19 {
            memory.record_summary(summary(n, "林风赶路"));
        }
        assert_score(&memory, "苏雪", 20, 0.1);

        memory.record_summary(summary(15, "苏雪归来"));
        memory.record_summary(summary(19, "苏雪出剑"));
        assert_score(&memory, "苏雪", 20, 0.1 + 0.1);

        for n in 15..=19 {
            memory.record_summary(summary(n, "苏雪同行"));
        }
        assert_score(&memory, "苏雪", 20, 0.1 + 0.2);
    }

    #[test]
    fn test_location_rule_and_cap() {
        let now = Utc::now();
        let mut memory = NovelMemory::new();
        for i in 0..40 {
            memory.note_location(&format!("地点{i}"), 1, now);
        }
        let selection = RelevanceEngine::default().select(&memory, 7);
        assert!(selection.locations.len() <= 5);
        assert!(!selection.locations.is_empty());
        assert!(selection
            .locations
            .iter()
            .all(|name| stable_hash(name, 7) % 3 == 0));
    }

    #[test]
    fn test_plots_and_timeline() {
        let now = Utc::now();
        let mut memory = NovelMemory::new();
        for n in 1..=15 {
            memory.push_event(TimelineEvent::chapter_event(n, format!("事件{n}"), now));
        }
        memory.fold_into_plots(2, &["甲".to_string(), "乙".to_string()], now);
        memory.fold_into_plots(3, &["丙".to_string(), "丁".to_string()], now);
        memory.fold_into_plots(12, &["丙事再起".to_string()], now);

        let selection = RelevanceEngine::default().select(&memory, 12);
        assert_eq!(selection.plots, vec!["情节线_2".to_string()]);
        let chapters: Vec<u32> = selection.timeline.iter().map(|e| e.chapter).collect();
        assert_eq!(chapters, (3..=12).collect::<Vec<_>>());
    }
}
