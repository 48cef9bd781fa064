//! NovelProject - the primary public API for writing a novel.
//!
//! Wires one fact store, one content generator and the project
//! configuration together: creating the story bible, generating chapters
//! in batches and checking what was written.

use crate::batch::{chapter_body, chapter_file_name, BatchOrchestrator, BatchReport};
use crate::config::{ConfigError, NovelConfig};
use crate::consistency::{ChapterCheck, ChapterText, ConsistencyChecker, FullCheck};
use crate::fact_store::FactStore;
use crate::generation::{ContentGenerator, GenerationError};
use crate::memory::{NovelMemory, ProgressStats, CHAPTER_PLAN_KEY, OUTLINE_KEY};
use crate::persist::{LoadWarning, PersistError};
use crate::plan::{ChapterPlan, Outline};
use crate::validate::{validate_chapter_number, CreativeBrief, ValidationError};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from NovelProject operations.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Memory error: {0}")]
    Persist(#[from] PersistError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No outline recorded yet - run `init` first")]
    MissingOutline,

    #[error("Project was opened without a content generator")]
    NoGenerator,
}

/// What [`NovelProject::create`] recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSetup {
    pub outline: Outline,
    pub characters: usize,
    pub planned_chapters: usize,
}

/// A novel in progress.
pub struct NovelProject {
    store: Arc<FactStore>,
    generator: Option<Arc<dyn ContentGenerator>>,
    checker: ConsistencyChecker,
    config: NovelConfig,
}

impl NovelProject {
    /// Open the project's memory as configured.
    ///
    /// Categories that could not be read are reset and returned as warnings.
    pub async fn open(
        config: NovelConfig,
        generator: Arc<dyn ContentGenerator>,
    ) -> Result<(Self, Vec<LoadWarning>), ProjectError> {
        Self::open_with(config, Some(generator)).await
    }

    /// Open for reading and checking only; generation fails with
    /// [`ProjectError::NoGenerator`].
    pub async fn open_read_only(config: NovelConfig) -> Result<(Self, Vec<LoadWarning>), ProjectError> {
        Self::open_with(config, None).await
    }

    async fn open_with(
        config: NovelConfig,
        generator: Option<Arc<dyn ContentGenerator>>,
    ) -> Result<(Self, Vec<LoadWarning>), ProjectError> {
        let (store, warnings) = FactStore::open(config.memory_dir()).await?;
        let project = Self {
            store: Arc::new(store),
            generator,
            checker: ConsistencyChecker::new(),
            config,
        };
        Ok((project, warnings))
    }

    pub fn with_checker(mut self, checker: ConsistencyChecker) -> Self {
        self.checker = checker;
        self
    }

    pub fn store(&self) -> &Arc<FactStore> {
        &self.store
    }

    pub fn config(&self) -> &NovelConfig {
        &self.config
    }

    fn generator(&self) -> Result<&Arc<dyn ContentGenerator>, ProjectError> {
        self.generator.as_ref().ok_or(ProjectError::NoGenerator)
    }

    /// Generate outline, cast and world view for `brief` and record them.
    pub async fn create(&self, brief: &CreativeBrief) -> Result<ProjectSetup, ProjectError> {
        info!(novel_type = %brief.novel_type(), words = brief.target_words(), "creating project");

        let generator = self.generator()?;
        let outline = generator.generate_outline(brief).await?;
        let characters = generator.generate_characters(&outline).await?;
        let worldview = generator.generate_worldview(&outline, &characters).await?;

        let plan = ChapterPlan::from_target(brief.target_words(), self.config.generation.chapter_words);
        if outline.estimated_chapters != 0 && outline.estimated_chapters as usize != plan.len() {
            info!(
                estimated = outline.estimated_chapters,
                planned = plan.len(),
                "outline estimate differs from the chapter plan; using the plan"
            );
        }

        let settings = vec![
            ("title".to_string(), json!(outline.title)),
            ("theme".to_string(), json!(outline.theme)),
            ("target_words".to_string(), json!(brief.target_words())),
            ("novel_type".to_string(), json!(brief.novel_type())),
            ("style".to_string(), json!(brief.style())),
            ("creative_idea".to_string(), json!(brief.idea())),
            ("created_at".to_string(), json!(Utc::now())),
            (OUTLINE_KEY.to_string(), to_value(&outline)?),
            (CHAPTER_PLAN_KEY.to_string(), to_value(&plan)?),
        ];

        let cast = characters.len();
        self.store.update_core_settings(settings).await?;
        self.store.merge_characters(characters).await?;
        self.store.merge_worldview(worldview).await?;

        info!(title = %outline.title, characters = cast, chapters = plan.len(), "project created");
        Ok(ProjectSetup {
            outline,
            characters: cast,
            planned_chapters: plan.len(),
        })
    }

    pub async fn outline(&self) -> Result<Outline, ProjectError> {
        self.store
            .read(NovelMemory::outline)
            .await
            .ok_or(ProjectError::MissingOutline)
    }

    /// The chapter plan, synced with the chapters written so far.
    ///
    /// Projects recorded without a plan get one derived from the outline.
    pub async fn plan(&self) -> Result<ChapterPlan, ProjectError> {
        let chapter_words = self.config.generation.chapter_words;
        self.store
            .read(|memory| {
                memory.chapter_plan().or_else(|| {
                    let outline = memory.outline()?;
                    let mut plan = ChapterPlan::from_target(outline.target_words, chapter_words);
                    plan.sync_with(memory.chapter_summaries());
                    Some(plan)
                })
            })
            .await
            .ok_or(ProjectError::MissingOutline)
    }

    fn orchestrator(&self) -> Result<BatchOrchestrator, ProjectError> {
        Ok(BatchOrchestrator::new(Arc::clone(self.generator()?), Arc::clone(&self.store))
            .with_config(self.config.batch_config()))
    }

    /// Generate `count` chapters starting at `start`.
    pub async fn generate_batch(&self, start: u32, count: u32) -> Result<BatchReport, ProjectError> {
        let orchestrator = self.orchestrator()?;
        let outline = self.outline().await?;
        let report = orchestrator.generate_range(&outline, start, count).await;
        self.save_report(&report).await;
        Ok(report)
    }

    /// Generate up to `limit` chapters the plan still lists as pending.
    pub async fn generate_pending(&self, limit: usize) -> Result<BatchReport, ProjectError> {
        let orchestrator = self.orchestrator()?;
        let outline = self.outline().await?;
        let pending: Vec<u32> = self.plan().await?.pending().into_iter().take(limit).collect();
        let report = orchestrator.generate_chapters(&outline, &pending).await;
        self.save_report(&report).await;
        Ok(report)
    }

    async fn save_report(&self, report: &BatchReport) {
        let Some(dir) = &self.config.generation.output_dir else {
            return;
        };
        let path = dir
            .join("logs")
            .join(format!("batch_results_{}.json", Utc::now().format("%Y%m%d_%H%M%S")));
        if let Err(e) = report.save_json(&path).await {
            warn!(path = %path.display(), error = %e, "failed to save batch report");
        }
    }

    /// Check arbitrary text as chapter `chapter` against the stored facts.
    pub async fn check_chapter(&self, chapter: u32, content: &str) -> Result<ChapterCheck, ProjectError> {
        validate_chapter_number(chapter)?;
        let window = self.config.batch_config().check_window;
        Ok(self
            .store
            .read(|memory| self.checker.check_against(memory, chapter, content, window))
            .await)
    }

    /// Aggregate check over every recorded chapter.
    ///
    /// Uses the chapter files in the output directory where they exist and
    /// the recorded summaries otherwise.
    pub async fn full_check(&self) -> Result<FullCheck, ProjectError> {
        let memory = self.store.snapshot().await;

        let mut chapters = BTreeMap::new();
        for (&number, summary) in memory.chapter_summaries() {
            let content = match self.chapter_file(number) {
                Some(path) if path.exists() => chapter_body(&tokio::fs::read_to_string(&path).await?).to_string(),
                _ => summary.summary.clone(),
            };
            chapters.insert(
                number,
                ChapterText {
                    content,
                    summary: summary.summary.clone(),
                },
            );
        }

        let worldview = Some(memory.worldview()).filter(|w| !w.is_empty());
        Ok(self.checker.full_check(memory.characters(), &chapters, worldview))
    }

    fn chapter_file(&self, chapter: u32) -> Option<PathBuf> {
        self.config
            .generation
            .output_dir
            .as_ref()
            .map(|dir| dir.join(chapter_file_name(chapter)))
    }

    pub async fn progress(&self) -> ProgressStats {
        self.store.read(NovelMemory::progress_stats).await
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, ProjectError> {
    serde_json::to_value(value).map_err(|e| ProjectError::Persist(PersistError::Json(e)))
}
