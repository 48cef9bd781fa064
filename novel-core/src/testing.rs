//! Testing utilities for novel generation.
//!
//! This module provides tools for tests that must not touch the network:
//! - `MockGenerator`, a scripted [`ContentGenerator`]
//! - Sample outline, cast, world view and brief fixtures

use crate::extract::ChapterDraft;
use crate::generation::{ChapterRequest, ContentGenerator, GenerationError};
use crate::memory::{CharacterProfile, WorldView};
use crate::plan::Outline;
use crate::validate::{CreativeBrief, NovelType, WritingStyle};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A scripted response for one chapter.
#[derive(Debug, Clone)]
pub enum MockChapter {
    Draft(ChapterDraft),
    Fail(GenerationError),
    /// Wait before answering.
    Delay(Duration, ChapterDraft),
}

/// A generator that answers from scripts instead of calling a model.
///
/// Chapters without a script get [`sample_chapter`]. Every chapter request
/// is recorded, and the peak number of concurrent chapter calls is tracked.
pub struct MockGenerator {
    outline: Outline,
    characters: Vec<CharacterProfile>,
    worldview: WorldView,
    /// Error returned by every setup call, if set.
    setup_failure: Option<GenerationError>,
    chapters: HashMap<u32, MockChapter>,
    latency: Duration,
    /// Chapter number and rendered context of every chapter request.
    requests: Mutex<Vec<(u32, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            outline: sample_outline(),
            characters: sample_characters(),
            worldview: sample_worldview(),
            setup_failure: None,
            chapters: HashMap::new(),
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Script the response for one chapter.
    pub fn script(mut self, chapter: u32, response: MockChapter) -> Self {
        self.chapters.insert(chapter, response);
        self
    }

    /// Delay applied to every unscripted chapter.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_outline(mut self, outline: Outline) -> Self {
        self.outline = outline;
        self
    }

    pub fn with_characters(mut self, characters: Vec<CharacterProfile>) -> Self {
        self.characters = characters;
        self
    }

    pub fn failing_setup(mut self, error: GenerationError) -> Self {
        self.setup_failure = Some(error);
        self
    }

    /// Chapter numbers requested so far, in request order.
    pub fn requested(&self) -> Vec<u32> {
        self.requests
            .lock()
            .map(|r| r.iter().map(|(chapter, _)| *chapter).collect())
            .unwrap_or_default()
    }

    /// The context the last request for `chapter` carried.
    pub fn context_for(&self, chapter: u32) -> Option<String> {
        let requests = self.requests.lock().ok()?;
        requests
            .iter()
            .rev()
            .find(|(n, _)| *n == chapter)
            .map(|(_, context)| context.clone())
    }

    /// Highest number of chapter calls that were running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn setup<T: Clone>(&self, value: &T) -> Result<T, GenerationError> {
        match &self.setup_failure {
            Some(err) => Err(err.clone()),
            None => Ok(value.clone()),
        }
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter even when the call is cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn generate_outline(&self, _brief: &CreativeBrief) -> Result<Outline, GenerationError> {
        self.setup(&self.outline)
    }

    async fn generate_characters(
        &self,
        _outline: &Outline,
    ) -> Result<Vec<CharacterProfile>, GenerationError> {
        self.setup(&self.characters)
    }

    async fn generate_worldview(
        &self,
        _outline: &Outline,
        _characters: &[CharacterProfile],
    ) -> Result<WorldView, GenerationError> {
        self.setup(&self.worldview)
    }

    async fn generate_chapter(
        &self,
        request: &ChapterRequest<'_>,
    ) -> Result<ChapterDraft, GenerationError> {
        let chapter = request.chapter_number;
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((chapter, request.context.to_string()));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        match self.chapters.get(&chapter) {
            Some(MockChapter::Draft(draft)) => Ok(draft.clone()),
            Some(MockChapter::Fail(err)) => Err(err.clone()),
            Some(MockChapter::Delay(delay, draft)) => {
                tokio::time::sleep(*delay).await;
                Ok(draft.clone())
            }
            None => {
                if !self.latency.is_zero() {
                    tokio::time::sleep(self.latency).await;
                }
                Ok(sample_chapter(chapter))
            }
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn sample_outline() -> Outline {
    Outline {
        title: "青云志".to_string(),
        theme: "少年成长与守护".to_string(),
        summary: "山村少年林风意外获得上古传承，拜入青云门，与苏雪一同揭开身世之谜。".to_string(),
        target_words: 100_000,
        estimated_chapters: 33,
        structure: [
            ("第一幕".to_string(), "下山拜师".to_string()),
            ("第二幕".to_string(), "宗门风波".to_string()),
            ("第三幕".to_string(), "身世大白".to_string()),
        ]
        .into_iter()
        .collect(),
        key_plot_points: vec!["获得传承".to_string(), "拜入青云门".to_string()],
        main_characters: vec!["林风".to_string(), "苏雪".to_string()],
    }
}

pub fn sample_characters() -> Vec<CharacterProfile> {
    vec![
        CharacterProfile::new("林风")
            .with_identity("山村少年，青云门弟子")
            .with_personality("坚毅 善良 冲动")
            .with_motivation("寻找失踪的父亲")
            .with_importance(10),
        CharacterProfile::new("苏雪")
            .with_identity("青云门内门弟子")
            .with_personality("冷静 聪慧")
            .with_motivation("守护宗门")
            .with_importance(8),
        CharacterProfile::new("赵长老")
            .with_identity("青云门长老")
            .with_personality("严厉 公正")
            .with_motivation("培养后辈")
            .with_importance(6),
    ]
}

pub fn sample_worldview() -> WorldView {
    WorldView {
        basic_setting: "修仙世界，宗门林立".to_string(),
        power_system: "炼气、筑基、金丹、元婴".to_string(),
        culture: "尊师重道 以武会友".to_string(),
        factions: vec!["青云门".to_string(), "魔教".to_string()],
        limitations: vec!["凡人不能御剑".to_string()],
        ..Default::default()
    }
}

/// A valid brief.
pub fn sample_brief() -> CreativeBrief {
    CreativeBrief::new(
        "一个山村少年意外获得上古传承，踏上修仙之路并揭开身世之谜",
        100_000,
        NovelType::Xianxia,
        WritingStyle::Serious,
    )
    .expect("sample brief is valid")
}

/// The default chapter returned for `chapter`.
pub fn sample_chapter(chapter: u32) -> ChapterDraft {
    ChapterDraft::new(
        format!("第{chapter}章"),
        format!("林风来到青云山，与苏雪并肩而行。坚毅的林风在第{chapter}章继续修炼，尊师重道。"),
    )
    .with_summary(format!("林风与苏雪在青云山修炼（第{chapter}章）"))
    .with_key_events(vec![format!("林风修炼突破{chapter}")])
    .with_development("林风", format!("第{chapter}章修为精进"))
}
