//! Read-only views over the memory: diagnostics, progress and search.

use super::store::NovelMemory;
use crate::text::{contains_ignore_case, truncate_chars};
use serde::Serialize;

/// Default number of search hits.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Word-for-word contradictions checked between special rules and limitations.
const NEGATIONS: &[(&str, &str)] = &[("可以", "不能"), ("能够", "无法"), ("允许", "禁止")];

/// Progress of the project against its target length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressStats {
    pub generated_chapters: usize,
    pub total_words: usize,
    pub target_words: u64,
    /// Percentage of the target written, 0.0 when no target is set.
    pub completion: f64,
    pub latest_chapter: Option<u32>,
    pub characters: usize,
    pub timeline_events: usize,
    pub locations: usize,
    pub plot_threads: usize,
    pub relationships: usize,
}

/// What kind of record a search hit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    Character,
    ChapterSummary,
    TimelineEvent,
}

/// A single search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub source: SearchSource,
    /// Character name, or the chapter number as text.
    pub key: String,
    pub snippet: String,
    pub score: f64,
}

impl NovelMemory {
    /// Problems worth a human look, in a stable order.
    pub fn consistency_checklist(&self) -> Vec<String> {
        let mut findings = Vec::new();

        for profile in self.characters() {
            let missing: Vec<&str> = [
                ("身份", profile.identity.as_str()),
                ("性格", profile.personality.as_str()),
                ("动机", profile.motivation.as_str()),
            ]
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(label, _)| *label)
            .collect();
            if !missing.is_empty() {
                findings.push(format!("角色 {} 缺少字段: {}", profile.name, missing.join("、")));
            }
        }

        let gaps = chapter_gaps(self.chapter_summaries().keys().copied());
        if !gaps.is_empty() {
            findings.push(format!("章节编号不连续，缺少第 {} 章", gaps.join("、")));
        }

        let out_of_order = self
            .timeline()
            .windows(2)
            .filter(|w| w[1].chapter < w[0].chapter)
            .count();
        if out_of_order > 0 {
            findings.push(format!("时间线有 {out_of_order} 处事件未按章节顺序记录"));
        }

        let rules = &self.worldview().special_rules;
        for limitation in &self.worldview().limitations {
            for (allow, deny) in NEGATIONS {
                if let Some(subject) = limitation.split(deny).nth(1) {
                    let subject = subject.trim();
                    if !subject.is_empty() && rules.contains(&format!("{allow}{subject}")) {
                        findings.push(format!("世界观规则与限制冲突: {limitation}"));
                    }
                }
            }
        }

        findings
    }

    /// Progress against the target length stored in core settings.
    pub fn progress_stats(&self) -> ProgressStats {
        let total_words: usize = self.chapter_summaries().values().map(|s| s.word_count).sum();
        let target_words = self
            .core_settings()
            .get("target_words")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let completion = if target_words > 0 {
            (total_words as f64 / target_words as f64 * 100.0).min(100.0)
        } else {
            0.0
        };

        ProgressStats {
            generated_chapters: self.chapter_summaries().len(),
            total_words,
            target_words,
            completion,
            latest_chapter: self.latest_chapter(),
            characters: self.character_count(),
            timeline_events: self.timeline().len(),
            locations: self.locations().len(),
            plot_threads: self.plots().len(),
            relationships: self.relationships().len(),
        }
    }

    /// Case-insensitive substring search across characters, summaries and timeline.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let mut hits = Vec::new();

        for profile in self.characters() {
            let haystack = format!(
                "{} {} {} {}",
                profile.name, profile.identity, profile.personality, profile.background
            );
            if contains_ignore_case(&haystack, query) {
                hits.push(SearchHit {
                    source: SearchSource::Character,
                    key: profile.name.clone(),
                    snippet: truncate_chars(&profile.identity, 100),
                    score: 1.0,
                });
            }
        }

        for (chapter, summary) in self.chapter_summaries() {
            if contains_ignore_case(&summary.summary, query) {
                hits.push(SearchHit {
                    source: SearchSource::ChapterSummary,
                    key: chapter.to_string(),
                    snippet: truncate_chars(&summary.summary, 100),
                    score: 0.8,
                });
            }
        }

        for event in self.timeline_sorted() {
            if contains_ignore_case(&event.description, query) {
                hits.push(SearchHit {
                    source: SearchSource::TimelineEvent,
                    key: event.chapter.to_string(),
                    snippet: truncate_chars(&event.description, 100),
                    score: 0.7,
                });
            }
        }

        // Stable sort keeps the per-source order among equal scores.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        hits
    }
}

/// Missing chapter numbers below the highest one, from sorted chapter numbers.
///
/// Short runs are listed one by one; longer runs collapse to `first-last`.
fn chapter_gaps(sorted: impl IntoIterator<Item = u32>) -> Vec<String> {
    const LISTED_RUN: u32 = 5;

    let mut gaps = Vec::new();
    let mut previous = 0u32;
    for chapter in sorted {
        if chapter > previous.saturating_add(1) {
            let (first, last) = (previous + 1, chapter - 1);
            if last - first < LISTED_RUN {
                gaps.extend((first..=last).map(|n| n.to_string()));
            } else {
                gaps.push(format!("{first}-{last}"));
            }
        }
        previous = chapter;
    }
    gaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{CharacterProfile, ChapterSummary, TimelineEvent, WorldView};
    use chrono::Utc;

    fn summary(chapter: u32, text: &str, words: usize) -> ChapterSummary {
        ChapterSummary {
            chapter_number: chapter,
            summary: text.to_string(),
            word_count: words,
            key_events: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_checklist_findings() {
        let now = Utc::now();
        let mut memory = NovelMemory::new();
        memory.merge_characters(
            vec![CharacterProfile::new("林风")
                .with_identity("弟子")
                .with_personality("沉默")
                .with_motivation("复仇")],
            now,
        );
        memory.merge_characters(vec![CharacterProfile::new("赵虎")], now);
        memory.record_summary(summary(1, "a", 10));
        memory.record_summary(summary(4, "b", 10));
        memory.push_event(TimelineEvent::chapter_event(4, "x", now));
        memory.push_event(TimelineEvent::chapter_event(1, "y", now));
        memory.merge_worldview(
            WorldView {
                special_rules: "修士可以飞行".to_string(),
                limitations: vec!["凡人不能飞行".to_string()],
                ..Default::default()
            },
            now,
        );

        let findings = memory.consistency_checklist();
        assert_eq!(findings.len(), 4, "{findings:?}");
        assert!(findings[0].contains("赵虎"));
        assert!(findings[1].contains("2、3"));
        assert!(findings[2].contains("1 处"));
        assert!(findings[3].contains("凡人不能飞行"));
    }

    #[test]
    fn test_chapter_gaps() {
        assert!(chapter_gaps([1, 2, 3]).is_empty());
        assert!(chapter_gaps(Vec::new()).is_empty());
        assert_eq!(chapter_gaps([2, 4]), vec!["1", "3"]);
        assert_eq!(chapter_gaps([1, 20]), vec!["2-19"]);
        assert_eq!(chapter_gaps([1, u32::MAX]), vec![format!("2-{}", u32::MAX - 1)]);
    }

    #[test]
    fn test_checklist_with_far_chapter_number() {
        let mut memory = NovelMemory::new();
        memory.record_summary(summary(1, "a", 10));
        memory.record_summary(summary(4_000_000_000, "b", 10));

        let findings = memory.consistency_checklist();
        assert_eq!(findings.len(), 1, "{findings:?}");
        assert!(findings[0].contains("2-3999999999"));
    }

    #[test]
    fn test_checklist_clean_memory() {
        assert!(NovelMemory::new().consistency_checklist().is_empty());
    }

    #[test]
    fn test_progress_stats() {
        let mut memory = NovelMemory::new();
        memory.update_core_settings(vec![("target_words".to_string(), serde_json::json!(10_000))]);
        memory.record_summary(summary(1, "a", 2_500));
        memory.record_summary(summary(2, "b", 2_500));

        let stats = memory.progress_stats();
        assert_eq!(stats.generated_chapters, 2);
        assert_eq!(stats.total_words, 5_000);
        assert!((stats.completion - 50.0).abs() < f64::EPSILON);
        assert_eq!(stats.latest_chapter, Some(2));
    }

    #[test]
    fn test_search_ranks_by_source() {
        let now = Utc::now();
        let mut memory = NovelMemory::new();
        memory.merge_characters(vec![CharacterProfile::new("林风").with_identity("青云宗弟子")], now);
        memory.record_summary(summary(2, "林风拜入青云宗", 10));
        memory.push_event(TimelineEvent::chapter_event(2, "青云宗收徒", now));

        let hits = memory.search("青云宗", DEFAULT_SEARCH_LIMIT);
        let sources: Vec<SearchSource> = hits.iter().map(|h| h.source).collect();
        assert_eq!(
            sources,
            vec![
                SearchSource::Character,
                SearchSource::ChapterSummary,
                SearchSource::TimelineEvent
            ]
        );
        assert_eq!(memory.search("青云宗", 1).len(), 1);
        assert!(memory.search("  ", 10).is_empty());
    }
}
