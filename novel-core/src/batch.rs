//! Batch chapter generation.
//!
//! Chapters are written by a bounded pool of concurrent workers. Each worker
//! assembles context from the fact store, calls the generator under a
//! timeout, records the result and optionally checks it. Chapters finish in
//! any order; a worker writing chapter N+1 does not see chapter N's facts
//! unless chapter N was recorded first. Use a concurrency of 1 for strict
//! ordering.

use crate::consistency::{ChapterCheck, ConsistencyChecker};
use crate::context::{ContextAssembler, ContextConfig};
use crate::extract::ChapterDraft;
use crate::fact_store::FactStore;
use crate::generation::{ChapterRequest, ContentGenerator, GenerationError};
use crate::memory::{CharacterProfile, NovelMemory};
use crate::persist::PersistError;
use crate::plan::{Outline, DEFAULT_CHAPTER_WORDS};
use crate::relevance::RelevanceEngine;
use crate::validate::{validate_chapter_number, ValidationError};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_CONCURRENCY: usize = 3;
pub const DEFAULT_CHAPTER_TIMEOUT: Duration = Duration::from_secs(30);
/// Previous summaries the per-chapter check compares against.
pub const DEFAULT_CHECK_WINDOW: u32 = 3;

/// Why a single chapter failed.
#[derive(Debug, Error)]
enum ChapterError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Failed to record chapter: {0}")]
    Persist(#[from] PersistError),

    #[error("Failed to write chapter file: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub concurrency: usize,
    pub chapter_timeout: Duration,
    pub chapter_words: u32,
    pub run_consistency: bool,
    pub check_window: u32,
    /// Where finished chapters are written, if anywhere.
    pub output_dir: Option<PathBuf>,
    pub context: ContextConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            chapter_timeout: DEFAULT_CHAPTER_TIMEOUT,
            chapter_words: DEFAULT_CHAPTER_WORDS,
            run_consistency: true,
            check_window: DEFAULT_CHECK_WINDOW,
            output_dir: None,
            context: ContextConfig::default(),
        }
    }
}

impl BatchConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_chapter_timeout(mut self, timeout: Duration) -> Self {
        self.chapter_timeout = timeout;
        self
    }

    pub fn with_chapter_words(mut self, words: u32) -> Self {
        self.chapter_words = words;
        self
    }

    pub fn with_consistency(mut self, enabled: bool) -> Self {
        self.run_consistency = enabled;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_context(mut self, context: ContextConfig) -> Self {
        self.context = context;
        self
    }
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedChapter {
    pub chapter_number: u32,
    pub title: String,
    /// Characters in the content.
    pub word_count: usize,
    pub summary: String,
    #[serde(default)]
    pub consistency: Option<ChapterCheck>,
    #[serde(default)]
    pub file: Option<PathBuf>,
    pub generation_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedChapter {
    pub chapter_number: u32,
    pub error: String,
    pub generation_secs: f64,
}

/// What happened to one requested chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChapterOutcome {
    Succeeded(GeneratedChapter),
    Failed(FailedChapter),
}

impl ChapterOutcome {
    pub fn chapter_number(&self) -> u32 {
        match self {
            ChapterOutcome::Succeeded(c) => c.chapter_number,
            ChapterOutcome::Failed(c) => c.chapter_number,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ChapterOutcome::Succeeded(_))
    }
}

/// Aggregate result of a batch run. Always produced, even if every chapter failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total_chapters: usize,
    pub start_chapter: u32,
    pub end_chapter: u32,
    pub total_words: usize,
    pub total_time_secs: f64,
    pub success_count: usize,
    pub failed_count: usize,
    /// Sorted by chapter number.
    pub chapters: Vec<ChapterOutcome>,
}

impl BatchReport {
    fn collect(requested: &[u32], mut chapters: Vec<ChapterOutcome>, elapsed: Duration) -> Self {
        chapters.sort_by_key(ChapterOutcome::chapter_number);
        let total_words = chapters
            .iter()
            .map(|outcome| match outcome {
                ChapterOutcome::Succeeded(c) => c.word_count,
                ChapterOutcome::Failed(_) => 0,
            })
            .sum();
        let success_count = chapters.iter().filter(|c| c.is_success()).count();

        Self {
            total_chapters: requested.len(),
            start_chapter: requested.iter().copied().min().unwrap_or(0),
            end_chapter: requested.iter().copied().max().unwrap_or(0),
            total_words,
            total_time_secs: elapsed.as_secs_f64(),
            success_count,
            failed_count: chapters.len() - success_count,
            chapters,
        }
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &GeneratedChapter> {
        self.chapters.iter().filter_map(|outcome| match outcome {
            ChapterOutcome::Succeeded(c) => Some(c),
            ChapterOutcome::Failed(_) => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = &FailedChapter> {
        self.chapters.iter().filter_map(|outcome| match outcome {
            ChapterOutcome::Failed(c) => Some(c),
            ChapterOutcome::Succeeded(_) => None,
        })
    }

    /// Write the report as pretty JSON.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_string_pretty(self)?).await?;
        info!(path = %path.display(), "saved batch report");
        Ok(())
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs chapter generation across a bounded worker pool.
pub struct BatchOrchestrator {
    generator: Arc<dyn ContentGenerator>,
    store: Arc<FactStore>,
    assembler: ContextAssembler,
    checker: ConsistencyChecker,
    config: BatchConfig,
}

impl BatchOrchestrator {
    pub fn new(generator: Arc<dyn ContentGenerator>, store: Arc<FactStore>) -> Self {
        Self {
            generator,
            store,
            assembler: ContextAssembler::default(),
            checker: ConsistencyChecker::new(),
            config: BatchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: BatchConfig) -> Self {
        self.assembler = ContextAssembler::new(self.assembler.engine().clone(), config.context.clone());
        self.config = config;
        self
    }

    pub fn with_relevance(mut self, engine: RelevanceEngine) -> Self {
        self.assembler = ContextAssembler::new(engine, self.config.context.clone());
        self
    }

    pub fn with_checker(mut self, checker: ConsistencyChecker) -> Self {
        self.checker = checker;
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Generate `count` chapters starting at `start`.
    pub async fn generate_range(&self, outline: &Outline, start: u32, count: u32) -> BatchReport {
        let chapters: Vec<u32> = (0..count).filter_map(|i| start.checked_add(i)).collect();
        self.generate_chapters(outline, &chapters).await
    }

    /// Generate the given chapters. Failures are reported per chapter.
    pub async fn generate_chapters(&self, outline: &Outline, chapters: &[u32]) -> BatchReport {
        let started = Instant::now();
        let total = chapters.len();
        info!(
            chapters = total,
            concurrency = self.config.concurrency,
            "starting batch generation"
        );

        let mut pending = stream::iter(chapters.iter().copied())
            .map(|chapter| self.run_chapter(outline, chapter))
            .buffer_unordered(self.config.concurrency.max(1));

        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = pending.next().await {
            match &outcome {
                ChapterOutcome::Succeeded(c) => info!(
                    chapter = c.chapter_number,
                    done = outcomes.len() + 1,
                    total,
                    "chapter finished"
                ),
                ChapterOutcome::Failed(c) => warn!(
                    chapter = c.chapter_number,
                    error = %c.error,
                    "chapter failed"
                ),
            }
            outcomes.push(outcome);
        }

        let report = BatchReport::collect(chapters, outcomes, started.elapsed());
        info!(
            succeeded = report.success_count,
            failed = report.failed_count,
            words = report.total_words,
            secs = report.total_time_secs,
            "batch generation finished"
        );
        report
    }

    async fn run_chapter(&self, outline: &Outline, chapter: u32) -> ChapterOutcome {
        let started = Instant::now();
        match self.write_chapter(outline, chapter).await {
            Ok(mut generated) => {
                generated.generation_secs = started.elapsed().as_secs_f64();
                ChapterOutcome::Succeeded(generated)
            }
            Err(err) => ChapterOutcome::Failed(FailedChapter {
                chapter_number: chapter,
                error: err.to_string(),
                generation_secs: started.elapsed().as_secs_f64(),
            }),
        }
    }

    async fn write_chapter(&self, outline: &Outline, chapter: u32) -> Result<GeneratedChapter, ChapterError> {
        validate_chapter_number(chapter)?;

        let context = self.store.assemble_context(&self.assembler, chapter).await;
        let characters = self.store.read(sorted_cast).await;
        let rendered = context.render();
        debug!(chapter, context_chars = rendered.chars().count(), "assembled context");

        let request = ChapterRequest {
            chapter_number: chapter,
            outline,
            characters: &characters,
            context: &rendered,
            target_words: self.config.chapter_words,
        };
        let draft = tokio::time::timeout(self.config.chapter_timeout, self.generator.generate_chapter(&request))
            .await
            .map_err(|_| GenerationError::Timeout)??;

        let update = self.store.record_chapter(chapter, &draft).await?;
        if !update.extraction.unknown_characters.is_empty() {
            debug!(chapter, unknown = ?update.extraction.unknown_characters, "development notes dropped");
        }

        let consistency = if self.config.run_consistency {
            Some(self.check(chapter, &draft).await)
        } else {
            None
        };

        let file = match &self.config.output_dir {
            Some(dir) => Some(write_chapter_file(dir, chapter, &draft).await?),
            None => None,
        };

        Ok(GeneratedChapter {
            chapter_number: chapter,
            title: if draft.title.trim().is_empty() {
                format!("第{chapter}章")
            } else {
                draft.title.clone()
            },
            word_count: draft.word_count(),
            summary: draft.effective_summary(),
            consistency,
            file,
            generation_secs: 0.0,
        })
    }

    async fn check(&self, chapter: u32, draft: &ChapterDraft) -> ChapterCheck {
        self.store
            .read(|memory| {
                self.checker
                    .check_against(memory, chapter, &draft.content, self.config.check_window)
            })
            .await
    }
}

fn sorted_cast(memory: &NovelMemory) -> Vec<CharacterProfile> {
    let mut cast: Vec<CharacterProfile> = memory.characters().cloned().collect();
    cast.sort_by(|a, b| b.importance.cmp(&a.importance).then_with(|| a.name.cmp(&b.name)));
    cast
}

/// File name used for a written chapter.
pub fn chapter_file_name(chapter: u32) -> String {
    format!("chapter_{chapter:04}.md")
}

async fn write_chapter_file(dir: &Path, chapter: u32, draft: &ChapterDraft) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(chapter_file_name(chapter));
    let text = format!("# 第{chapter}章: {}\n\n{}\n", draft.title, draft.content);
    tokio::fs::write(&path, text).await?;
    Ok(path)
}

/// Chapter body from a file written by the orchestrator, without its heading.
pub fn chapter_body(text: &str) -> &str {
    match text.strip_prefix("# ") {
        Some(rest) => rest.split_once("\n\n").map(|(_, body)| body.trim_end()).unwrap_or(""),
        None => text.trim_end(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryDir;
    use crate::testing::{sample_characters, sample_outline, MockChapter, MockGenerator};
    use tempfile::TempDir;

    async fn setup(temp: &TempDir, generator: MockGenerator) -> (BatchOrchestrator, Arc<FactStore>, Arc<MockGenerator>) {
        let (store, _) = FactStore::open(MemoryDir::new(temp.path().join("memory"))).await.unwrap();
        let store = Arc::new(store);
        store.merge_characters(sample_characters()).await.unwrap();
        let generator = Arc::new(generator);
        let orchestrator = BatchOrchestrator::new(generator.clone(), store.clone());
        (orchestrator, store, generator)
    }

    #[tokio::test]
    async fn test_range_records_every_chapter() {
        let temp = TempDir::new().unwrap();
        let (orchestrator, store, _) = setup(&temp, MockGenerator::new()).await;

        let report = orchestrator.generate_range(&sample_outline(), 1, 4).await;
        assert_eq!(report.total_chapters, 4);
        assert_eq!((report.start_chapter, report.end_chapter), (1, 4));
        assert_eq!(report.success_count, 4);
        assert_eq!(report.failed_count, 0);
        let numbers: Vec<u32> = report.chapters.iter().map(ChapterOutcome::chapter_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(report.total_words, report.succeeded().map(|c| c.word_count).sum::<usize>());

        let memory = store.snapshot().await;
        assert_eq!(memory.chapter_summaries().len(), 4);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_batch() {
        let temp = TempDir::new().unwrap();
        let generator = MockGenerator::new().script(2, MockChapter::Fail(GenerationError::Network("connection reset".to_string())));
        let (orchestrator, store, _) = setup(&temp, generator).await;

        let report = orchestrator.generate_range(&sample_outline(), 1, 3).await;
        assert_eq!(report.success_count, 2);
        assert_eq!(report.failed_count, 1);
        let failed: Vec<&FailedChapter> = report.failed().collect();
        assert_eq!(failed[0].chapter_number, 2);
        assert!(failed[0].error.contains("connection reset"));
        assert!(store.snapshot().await.chapter_summary(2).is_none());
    }

    #[tokio::test]
    async fn test_timeout_is_a_failed_chapter() {
        let temp = TempDir::new().unwrap();
        let generator = MockGenerator::new().script(
            1,
            MockChapter::Delay(Duration::from_secs(5), ChapterDraft::new("慢", "林风慢慢走")),
        );
        let (orchestrator, _, _) = setup(&temp, generator).await;
        let orchestrator = orchestrator.with_config(
            BatchConfig::default().with_chapter_timeout(Duration::from_millis(50)),
        );

        let report = orchestrator.generate_range(&sample_outline(), 1, 2).await;
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.failed().next().unwrap().error, GenerationError::Timeout.to_string());
        assert_eq!(report.success_count, 1);
    }

    #[tokio::test]
    async fn test_invalid_chapter_number_fails_alone() {
        let temp = TempDir::new().unwrap();
        let (orchestrator, _, generator) = setup(&temp, MockGenerator::new()).await;

        let report = orchestrator.generate_chapters(&sample_outline(), &[0, 1]).await;
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.chapters[0].chapter_number(), 0);
        assert!(!report.chapters[0].is_success());
        assert_eq!(generator.requested(), vec![1]);
    }

    #[tokio::test]
    async fn test_consistency_and_output_files() {
        let temp = TempDir::new().unwrap();
        let (orchestrator, _, _) = setup(&temp, MockGenerator::new()).await;
        let out = temp.path().join("chapters");
        let orchestrator = orchestrator.with_config(BatchConfig::default().with_output_dir(&out));

        let report = orchestrator.generate_range(&sample_outline(), 1, 2).await;
        for chapter in report.succeeded() {
            let check = chapter.consistency.as_ref().unwrap();
            assert!(check.overall.score <= 100);
            let file = chapter.file.as_ref().unwrap();
            assert_eq!(file, &out.join(chapter_file_name(chapter.chapter_number)));
            let text = std::fs::read_to_string(file).unwrap();
            assert!(text.starts_with(&format!("# 第{}章", chapter.chapter_number)));
            assert!(!chapter_body(&text).is_empty());
        }

        let report_path = temp.path().join("logs").join("batch.json");
        report.save_json(&report_path).await.unwrap();
        let saved: BatchReport =
            serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
        assert_eq!(saved.success_count, 2);
    }

    #[tokio::test]
    async fn test_consistency_can_be_disabled() {
        let temp = TempDir::new().unwrap();
        let (orchestrator, _, _) = setup(&temp, MockGenerator::new()).await;
        let orchestrator = orchestrator.with_config(BatchConfig::default().with_consistency(false));

        let report = orchestrator.generate_range(&sample_outline(), 1, 1).await;
        assert!(report.succeeded().all(|c| c.consistency.is_none()));
    }

    #[test]
    fn test_chapter_body() {
        assert_eq!(chapter_body("# 第1章: 下山\n\n林风下山\n"), "林风下山");
        assert_eq!(chapter_body("没有标题"), "没有标题");
        assert_eq!(chapter_file_name(7), "chapter_0007.md");
    }

    #[test]
    fn test_empty_report() {
        let report = BatchReport::collect(&[], Vec::new(), Duration::ZERO);
        assert_eq!(report.total_chapters, 0);
        assert_eq!(report.success_count + report.failed_count, 0);
    }
}
