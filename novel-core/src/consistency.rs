//! Consistency checker: heuristic 0–100 scores for new chapter text.
//!
//! Three independent axes (character traits, plot continuity, world rules)
//! plus an aggregate over the whole book. Checks never fail on malformed
//! input; missing fields read as empty.

use crate::memory::{CharacterProfile, NovelMemory, WorldView};
use crate::text::cjk_runs;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const STOPWORDS: &[&str] = &[
    "的", "了", "在", "是", "我", "有", "和", "就", "不", "人", "都", "一", "一个", "上", "也",
    "很", "到", "说", "要", "去", "你", "会", "着", "没有", "看", "好", "自己", "这",
];

const MAX_KEYWORDS: usize = 10;

const TIME_INDICATORS: &[&str] = &["之前", "之后", "刚才", "现在", "未来", "过去"];

const CONTRADICTIONS: &[(&str, &str)] = &[("死", "活"), ("有", "无"), ("存在", "不存在")];

const FULL_SCORE: u32 = 100;

/// Issues kept per component in the aggregate check.
const COMPONENT_ISSUE_LIMIT: usize = 5;

/// Up to ten content-script keywords, stop words removed.
pub fn keywords(text: &str) -> Vec<String> {
    cjk_runs(text)
        .filter(|word| !STOPWORDS.contains(word))
        .take(MAX_KEYWORDS)
        .map(str::to_string)
        .collect()
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub passed: bool,
    /// Always within 0..=100.
    pub score: u32,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

impl Default for CheckResult {
    fn default() -> Self {
        Self {
            passed: true,
            score: FULL_SCORE,
            issues: Vec::new(),
            suggestions: Vec::new(),
        }
    }
}

impl CheckResult {
    fn deduct(&mut self, points: u32) {
        self.score = self.score.saturating_sub(points);
    }
}

/// A project-specific world rule.
pub trait WorldRule: Send + Sync {
    /// Descriptions of every violation found in `content`.
    fn violations(&self, content: &str, worldview: &WorldView) -> Vec<String>;
}

/// What a per-chapter check can compare against. Absent parts are skipped.
#[derive(Debug, Clone, Default)]
pub struct CheckContext<'a> {
    pub characters: Vec<&'a CharacterProfile>,
    /// Summaries of earlier chapters, oldest first.
    pub previous_summaries: Option<Vec<String>>,
    pub worldview: Option<&'a WorldView>,
}

impl<'a> CheckContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_characters(mut self, characters: impl IntoIterator<Item = &'a CharacterProfile>) -> Self {
        self.characters = characters.into_iter().collect();
        self
    }

    pub fn with_previous_summaries(mut self, summaries: Vec<String>) -> Self {
        self.previous_summaries = Some(summaries);
        self
    }

    pub fn with_worldview(mut self, worldview: &'a WorldView) -> Self {
        self.worldview = Some(worldview);
        self
    }
}

/// Composite result of checking one chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterCheck {
    /// Weakest executed check, with every issue and suggestion.
    #[serde(flatten)]
    pub overall: CheckResult,
    /// Individual results keyed by `character_<name>`, `plot` or `worldview`.
    pub details: BTreeMap<String, CheckResult>,
}

/// Chapter text used by the aggregate check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChapterText {
    pub content: String,
    pub summary: String,
}

/// One component of the aggregate check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentScore {
    pub score: u32,
    pub issues: Vec<String>,
}

impl ComponentScore {
    fn average(scores: &[u32], issues: Vec<String>) -> Self {
        let score = if scores.is_empty() {
            FULL_SCORE
        } else {
            scores.iter().sum::<u32>() / scores.len() as u32
        };
        Self {
            score,
            issues: issues.into_iter().take(COMPONENT_ISSUE_LIMIT).collect(),
        }
    }
}

/// Aggregate result over the whole book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullCheck {
    pub overall_score: u32,
    pub character: ComponentScore,
    pub plot: ComponentScore,
    pub worldview: ComponentScore,
    /// Not evaluated yet; always a full score.
    pub timeline: ComponentScore,
}

/// `0.3 c + 0.4 p + 0.2 w + 0.1 t`, truncated.
pub fn weighted_score(character: u32, plot: u32, worldview: u32, timeline: u32) -> u32 {
    (3 * character + 4 * plot + 2 * worldview + timeline) / 10
}

/// Runs the consistency checks.
#[derive(Default)]
pub struct ConsistencyChecker {
    rules: Vec<Box<dyn WorldRule>>,
}

impl std::fmt::Debug for ConsistencyChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistencyChecker")
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl ConsistencyChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a world rule plugin.
    pub fn with_rule(mut self, rule: impl WorldRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    // =========================================================================
    // Axis checks
    // =========================================================================

    /// Whether the chapter reflects the character's personality and abilities.
    pub fn check_character(&self, profile: &CharacterProfile, content: &str) -> CheckResult {
        let mut result = CheckResult::default();

        if !profile.personality.trim().is_empty() {
            let traits = keywords(&profile.personality);
            let present: BTreeSet<String> = keywords(content).into_iter().collect();
            let missing: Vec<&str> = traits
                .iter()
                .filter(|k| !present.contains(*k))
                .map(String::as_str)
                .collect();
            let ratio = (traits.len() - missing.len()) as f64 / traits.len().max(1) as f64;

            if ratio < 0.3 {
                result.passed = false;
                result.deduct(30);
                result
                    .issues
                    .push(format!("人物'{}'的性格表现不一致", profile.name));
                let shown: Vec<&str> = missing.into_iter().take(5).collect();
                result.suggestions.push(format!(
                    "在描述{}时，请更多体现: {}",
                    profile.name,
                    shown.join(", ")
                ));
            }
        }

        if !profile.abilities.is_empty()
            && !profile.abilities.iter().any(|a| content.contains(a.as_str()))
        {
            result
                .issues
                .push(format!("人物'{}'的能力未在场景中体现", profile.name));
        }

        result
    }

    /// Continuity with the previous chapter and obvious contradictions.
    pub fn check_plot(&self, content: &str, previous_summaries: &[String]) -> CheckResult {
        let mut result = CheckResult::default();

        if let Some(last) = previous_summaries.last() {
            let last_keywords: BTreeSet<String> = keywords(last).into_iter().collect();
            let current: BTreeSet<String> = keywords(content).into_iter().collect();
            let continuity = if last_keywords.is_empty() || current.is_empty() {
                0.0
            } else {
                last_keywords.intersection(&current).count() as f64 / last_keywords.len() as f64
            };

            if continuity < 0.2 {
                result.deduct(20);
                result.issues.push("情节连贯性较弱".to_string());
                result.suggestions.push("考虑增加与上一章的连接".to_string());
            }
        }

        let logical = logical_issues(content);
        if !logical.is_empty() {
            result.passed = false;
            result.deduct(10 * logical.len() as u32);
            result.issues.extend(logical);
            result.suggestions.push("检查情节逻辑，修复矛盾之处".to_string());
        }

        result
    }

    /// Registered rule plugins and whether the culture shows through.
    pub fn check_worldview(&self, content: &str, worldview: &WorldView) -> CheckResult {
        let mut result = CheckResult::default();

        if !worldview.special_rules.trim().is_empty() {
            let violations: Vec<String> = self
                .rules
                .iter()
                .flat_map(|rule| rule.violations(content, worldview))
                .collect();
            if !violations.is_empty() {
                result.passed = false;
                result.deduct(15 * violations.len() as u32);
                result.issues.extend(violations);
            }
        }

        if !worldview.culture.trim().is_empty() {
            let culture = keywords(&worldview.culture);
            let present: BTreeSet<String> = keywords(content).into_iter().collect();
            if !culture.is_empty() && !culture.iter().take(5).any(|k| present.contains(k)) {
                result.issues.push("文化风俗元素未充分体现".to_string());
                let shown: Vec<&str> = culture.iter().take(3).map(String::as_str).collect();
                result
                    .suggestions
                    .push(format!("考虑加入: {}", shown.join(", ")));
            }
        }

        result
    }

    // =========================================================================
    // Composite checks
    // =========================================================================

    /// Run every check the context supports; the score is the weakest one.
    pub fn check_chapter(&self, content: &str, context: &CheckContext<'_>) -> ChapterCheck {
        let mut details = BTreeMap::new();

        for profile in &context.characters {
            if !profile.name.is_empty() && content.contains(profile.name.as_str()) {
                details.insert(
                    format!("character_{}", profile.name),
                    self.check_character(profile, content),
                );
            }
        }
        if let Some(summaries) = &context.previous_summaries {
            details.insert("plot".to_string(), self.check_plot(content, summaries));
        }
        if let Some(worldview) = context.worldview {
            details.insert("worldview".to_string(), self.check_worldview(content, worldview));
        }

        let mut overall = CheckResult::default();
        for result in details.values() {
            overall.passed &= result.passed;
            overall.score = overall.score.min(result.score);
            overall.issues.extend(result.issues.iter().cloned());
            overall.suggestions.extend(result.suggestions.iter().cloned());
        }

        ChapterCheck { overall, details }
    }

    /// Check `content` as chapter `chapter` against what the memory holds:
    /// every character, up to `window` earlier summaries, and the world view
    /// if one was recorded.
    pub fn check_against(
        &self,
        memory: &NovelMemory,
        chapter: u32,
        content: &str,
        window: u32,
    ) -> ChapterCheck {
        let summaries: Vec<String> = memory
            .recent_summaries(chapter, window)
            .into_iter()
            .map(|s| s.summary.clone())
            .collect();

        let mut context = CheckContext::new().with_characters(memory.characters());
        if !summaries.is_empty() {
            context = context.with_previous_summaries(summaries);
        }
        if !memory.worldview().is_empty() {
            context = context.with_worldview(memory.worldview());
        }
        self.check_chapter(content, &context)
    }

    /// Aggregate over every chapter of the book.
    pub fn full_check<'a>(
        &self,
        characters: impl IntoIterator<Item = &'a CharacterProfile>,
        chapters: &BTreeMap<u32, ChapterText>,
        worldview: Option<&WorldView>,
    ) -> FullCheck {
        let mut scores = Vec::new();
        let mut issues = Vec::new();
        for profile in characters {
            if profile.name.is_empty() {
                continue;
            }
            for chapter in chapters.values() {
                if chapter.content.contains(profile.name.as_str()) {
                    let result = self.check_character(profile, &chapter.content);
                    scores.push(result.score);
                    issues.extend(result.issues);
                }
            }
        }
        let character = ComponentScore::average(&scores, issues);

        let ordered: Vec<&ChapterText> = chapters.values().collect();
        let mut scores = Vec::new();
        let mut issues = Vec::new();
        for pair in ordered.windows(2) {
            let result = self.check_plot(&pair[1].content, std::slice::from_ref(&pair[0].summary));
            scores.push(result.score);
            issues.extend(result.issues);
        }
        let plot = ComponentScore::average(&scores, issues);

        let mut scores = Vec::new();
        let mut issues = Vec::new();
        if let Some(worldview) = worldview.filter(|w| !w.is_empty()) {
            for chapter in chapters.values() {
                let result = self.check_worldview(&chapter.content, worldview);
                scores.push(result.score);
                issues.extend(result.issues);
            }
        }
        let worldview = ComponentScore::average(&scores, issues);

        let timeline = ComponentScore::average(&[], Vec::new());

        FullCheck {
            overall_score: weighted_score(character.score, plot.score, worldview.score, timeline.score),
            character,
            plot,
            worldview,
            timeline,
        }
    }
}

fn logical_issues(content: &str) -> Vec<String> {
    let mut issues = Vec::new();

    let time_mentions = TIME_INDICATORS
        .iter()
        .filter(|indicator| content.contains(**indicator))
        .count();
    if time_mentions > 3 {
        issues.push("时间描述可能存在矛盾".to_string());
    }

    for (a, b) in CONTRADICTIONS {
        if content.contains(a) && content.contains(b) {
            issues.push(format!("可能存在'{a}'和'{b}'的矛盾"));
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hero() -> CharacterProfile {
        CharacterProfile::new("张三")
            .with_personality("勇敢、聪明、善良")
            .with_abilities(vec!["剑法".to_string(), "法术".to_string()])
    }

    #[test]
    fn test_keywords_drop_stopwords_and_cap() {
        assert_eq!(keywords("勇敢、聪明、善良"), vec!["勇敢", "聪明", "善良"]);
        assert_eq!(keywords("自己，一个，没有"), Vec::<String>::new());
        let many: String = (0..20).map(|_| "山河，").collect();
        assert_eq!(keywords(&many).len(), MAX_KEYWORDS);
    }

    #[test]
    fn test_character_mismatch() {
        let checker = ConsistencyChecker::new();
        let result = checker.check_character(&hero(), "张三是一个胆小的人，他什么都不会。");
        assert!(!result.passed);
        assert_eq!(result.score, 70);
        assert_eq!(result.issues.len(), 2);
        assert!(result.suggestions[0].contains("勇敢, 聪明, 善良"));
    }

    #[test]
    fn test_character_match() {
        let checker = ConsistencyChecker::new();
        let result = checker.check_character(&hero(), "张三，勇敢，以剑法破敌。");
        assert!(result.passed);
        assert_eq!(result.score, 100);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_plot_contradictions_fail() {
        let checker = ConsistencyChecker::new();
        let result = checker.check_plot("他死了，又活了过来。", &[]);
        assert!(!result.passed);
        assert_eq!(result.score, 90);

        let result = checker.check_plot(
            "之前之后刚才现在，有无死活存在不存在",
            &["战斗结束".to_string()],
        );
        assert_eq!(result.score, 100 - 20 - 40);
        assert_eq!(result.issues.len(), 5);
    }

    #[test]
    fn test_plot_continuity() {
        let checker = ConsistencyChecker::new();
        let result = checker.check_plot("林风，青云山，拜师", &["林风，青云山".to_string()]);
        assert!(result.passed);
        assert_eq!(result.score, 100);

        let result = checker.check_plot("新的章节开始了。", &["上一章结束了战斗。".to_string()]);
        assert!(result.passed);
        assert_eq!(result.score, 80);
    }

    struct NoFlying;

    impl WorldRule for NoFlying {
        fn violations(&self, content: &str, _worldview: &WorldView) -> Vec<String> {
            if content.contains("御剑飞行") {
                vec!["凡人御剑飞行".to_string()]
            } else {
                Vec::new()
            }
        }
    }

    #[test]
    fn test_world_rule_plugins() {
        let worldview = WorldView {
            special_rules: "凡人不能飞行".to_string(),
            culture: "祭祀，礼乐".to_string(),
            ..Default::default()
        };

        let plain = ConsistencyChecker::new().check_worldview("他御剑飞行", &worldview);
        assert!(plain.passed);
        assert_eq!(plain.score, 100);
        assert_eq!(plain.issues, vec!["文化风俗元素未充分体现"]);
        assert_eq!(plain.suggestions, vec!["考虑加入: 祭祀, 礼乐"]);

        let ruled = ConsistencyChecker::new()
            .with_rule(NoFlying)
            .check_worldview("他御剑飞行，祭祀", &worldview);
        assert!(!ruled.passed);
        assert_eq!(ruled.score, 85);
        assert_eq!(ruled.issues, vec!["凡人御剑飞行"]);
    }

    #[test]
    fn test_chapter_check_takes_weakest() {
        let checker = ConsistencyChecker::new();
        let profile = hero();
        let context = CheckContext::new()
            .with_characters([&profile])
            .with_previous_summaries(vec!["上一章结束了战斗。".to_string()]);

        let check = checker.check_chapter("张三是一个胆小的人，他什么都不会。", &context);
        assert_eq!(check.details.len(), 2);
        let min = check.details.values().map(|r| r.score).min().unwrap();
        assert_eq!(check.overall.score, min);
        assert!(!check.overall.passed);
        assert!(check.overall.score <= 100);
    }

    #[test]
    fn test_chapter_check_without_context() {
        let check = ConsistencyChecker::new().check_chapter("任意内容", &CheckContext::new());
        assert!(check.details.is_empty());
        assert!(check.overall.passed);
        assert_eq!(check.overall.score, 100);
    }

    #[test]
    fn test_weighted_score() {
        assert_eq!(weighted_score(60, 90, 100, 100), 84);
        assert_eq!(weighted_score(100, 100, 100, 100), 100);
        assert_eq!(weighted_score(0, 0, 0, 0), 0);
    }

    #[test]
    fn test_full_check() {
        let checker = ConsistencyChecker::new();
        let mut chapters = BTreeMap::new();
        chapters.insert(
            1,
            ChapterText {
                content: "张三是一个胆小的人，他什么都不会。".to_string(),
                summary: "张三胆小".to_string(),
            },
        );
        chapters.insert(
            2,
            ChapterText {
                content: "张三胆小，却死里逃生，活了下来。".to_string(),
                summary: "逃生".to_string(),
            },
        );

        let result = checker.full_check([&hero()], &chapters, None);
        assert_eq!(result.character.score, 70);
        assert_eq!(result.plot.score, 90);
        assert_eq!(result.worldview.score, 100);
        assert_eq!(result.timeline.score, 100);
        assert_eq!(result.overall_score, weighted_score(70, 90, 100, 100));
    }

    #[test]
    fn test_full_check_empty_book() {
        let result = ConsistencyChecker::new().full_check(Vec::<&CharacterProfile>::new(), &BTreeMap::new(), None);
        assert_eq!(result.overall_score, 100);
    }
}
