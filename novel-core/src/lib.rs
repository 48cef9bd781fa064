//! Long-horizon memory for writing novels with a language model.
//!
//! This crate provides:
//! - A durable fact store for characters, world, timeline, locations and plot threads
//! - Deterministic relevance selection and bounded context assembly per chapter
//! - Fact extraction from generated chapters
//! - Heuristic consistency scoring
//! - Concurrent batch chapter generation
//!
//! # Quick Start
//!
//! ```ignore
//! use novel_core::{CreativeBrief, NovelConfig, NovelProject, NovelType, WritingStyle};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NovelConfig::load("novel.toml")?;
//!     let generator = Arc::new(config.generator()?);
//!     let (project, _warnings) = NovelProject::open(config, generator).await?;
//!
//!     let brief = CreativeBrief::new(
//!         "一个山村少年意外获得上古传承，踏上修仙之路并揭开身世之谜",
//!         100_000,
//!         NovelType::Xianxia,
//!         WritingStyle::Serious,
//!     )?;
//!     project.create(&brief).await?;
//!
//!     let report = project.generate_batch(1, 3).await?;
//!     println!("{} of {} chapters written", report.success_count, report.total_chapters);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod consistency;
pub mod context;
pub mod extract;
pub mod fact_store;
pub mod generation;
pub mod memory;
pub mod persist;
pub mod plan;
pub mod project;
pub mod relevance;
pub mod testing;
pub mod text;
pub mod validate;

// Primary public API
pub use batch::{BatchConfig, BatchOrchestrator, BatchReport, ChapterOutcome};
pub use config::{ConfigError, NovelConfig};
pub use consistency::{ChapterCheck, CheckResult, ConsistencyChecker, FullCheck, WorldRule};
pub use context::{ContextAssembler, ContextBundle, ContextConfig};
pub use extract::{ChapterDraft, FactExtractor, HeuristicExtractor};
pub use fact_store::FactStore;
pub use generation::{ContentGenerator, DeepSeekGenerator, GenerationError};
pub use memory::{CharacterProfile, CharacterUpdate, NovelMemory, WorldView};
pub use persist::{MemoryDir, PersistError};
pub use plan::{ChapterPlan, Outline};
pub use project::{NovelProject, ProjectError};
pub use relevance::{RelevanceConfig, RelevanceEngine};
pub use testing::{MockChapter, MockGenerator};
pub use validate::{CreativeBrief, NovelType, ValidationError, WritingStyle};
