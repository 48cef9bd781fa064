//! The fact store: one project's memory, shared and durable.
//!
//! Every mutation takes the single writer lock, applies the change, and
//! flushes the whole store before releasing it, so two mutations never
//! interleave on disk. Readers only touch the in-memory copy and may see
//! state from just before an in-flight mutation.

use crate::context::{ContextAssembler, ContextBundle};
use crate::extract::{apply_chapter, ChapterDraft, ExtractionReport, FactExtractor, HeuristicExtractor};
use crate::memory::{CharacterProfile, CharacterUpdate, NovelMemory, WorldView};
use crate::persist::{ImportError, LoadWarning, MemoryDir, MemoryExport, PersistError, SaveReport};
use chrono::Utc;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Result of recording a chapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterUpdate {
    pub extraction: ExtractionReport,
    pub save: SaveReport,
}

/// Shared handle to a project's memory.
pub struct FactStore {
    dir: MemoryDir,
    memory: RwLock<NovelMemory>,
    writer: Mutex<()>,
    extractor: Arc<dyn FactExtractor>,
}

impl std::fmt::Debug for FactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactStore").field("dir", &self.dir).finish_non_exhaustive()
    }
}

impl FactStore {
    /// Load the store from `dir`, creating the layout if needed.
    ///
    /// Categories that could not be read are empty and listed in the warnings.
    pub async fn open(dir: MemoryDir) -> Result<(Self, Vec<LoadWarning>), PersistError> {
        let (memory, warnings) = dir.load().await?;
        for warning in &warnings {
            warn!(%warning, "memory category reset on load");
        }
        let store = Self {
            dir,
            memory: RwLock::new(memory),
            writer: Mutex::new(()),
            extractor: Arc::new(HeuristicExtractor::new()),
        };
        Ok((store, warnings))
    }

    /// Replace the fact extractor used by [`FactStore::record_chapter`].
    pub fn with_extractor(mut self, extractor: impl FactExtractor + 'static) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn dir(&self) -> &MemoryDir {
        &self.dir
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// A copy of the current memory.
    pub async fn snapshot(&self) -> NovelMemory {
        self.memory.read().await.clone()
    }

    /// Run `f` against the current memory without copying it.
    pub async fn read<R>(&self, f: impl FnOnce(&NovelMemory) -> R) -> R {
        let memory = self.memory.read().await;
        f(&*memory)
    }

    pub async fn assemble_context(&self, assembler: &ContextAssembler, chapter: u32) -> ContextBundle {
        self.read(|memory| assembler.assemble(memory, chapter)).await
    }

    pub async fn export_all(&self) -> MemoryExport {
        self.read(|memory| MemoryExport::from_memory(memory, Utc::now()))
            .await
    }

    pub async fn export_to_file(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let export = self.export_all().await;
        let content = serde_json::to_string_pretty(&export)?;
        tokio::fs::write(path.as_ref(), content).await?;
        info!(path = %path.as_ref().display(), "exported story memory");
        Ok(())
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Apply `f` under the writer lock, then flush.
    async fn mutate<R>(
        &self,
        f: impl FnOnce(&mut NovelMemory) -> R,
    ) -> Result<(R, SaveReport), PersistError> {
        let _writer = self.writer.lock().await;
        let result = {
            let mut memory = self.memory.write().await;
            f(&mut *memory)
        };
        let memory = self.memory.read().await;
        let report = self.dir.save(&*memory).await?;
        Ok((result, report))
    }

    /// Flush the current state.
    pub async fn save(&self) -> Result<SaveReport, PersistError> {
        self.mutate(|_| ()).await.map(|(_, report)| report)
    }

    pub async fn update_core_settings(
        &self,
        entries: Vec<(String, Value)>,
    ) -> Result<SaveReport, PersistError> {
        self.mutate(|memory| memory.update_core_settings(entries))
            .await
            .map(|(_, report)| report)
    }

    pub async fn merge_characters(
        &self,
        characters: Vec<CharacterProfile>,
    ) -> Result<SaveReport, PersistError> {
        self.mutate(|memory| memory.merge_characters(characters, Utc::now()))
            .await
            .map(|(_, report)| report)
    }

    /// Edit some attributes of a known character. Returns `false` for an unknown name.
    pub async fn update_character(&self, name: &str, update: CharacterUpdate) -> Result<bool, PersistError> {
        self.mutate(|memory| memory.update_character(name, update, Utc::now()))
            .await
            .map(|(found, _)| found)
    }

    /// Record a free-text relation from one known character to another.
    pub async fn add_relationship(&self, from: &str, to: &str, relation: &str) -> Result<bool, PersistError> {
        self.mutate(|memory| memory.add_relationship(from, to, relation, Utc::now()))
            .await
            .map(|(added, _)| added)
    }

    pub async fn merge_worldview(&self, worldview: WorldView) -> Result<SaveReport, PersistError> {
        self.mutate(|memory| memory.merge_worldview(worldview, Utc::now()))
            .await
            .map(|(_, report)| report)
    }

    /// Fold a finished chapter into the memory and flush.
    pub async fn record_chapter(
        &self,
        chapter: u32,
        draft: &ChapterDraft,
    ) -> Result<ChapterUpdate, PersistError> {
        let extractor = Arc::clone(&self.extractor);
        let (extraction, save) = self
            .mutate(|memory| apply_chapter(memory, chapter, draft, extractor.as_ref(), Utc::now()))
            .await?;
        info!(
            chapter,
            words = draft.word_count(),
            new_locations = extraction.new_locations.len(),
            save_failures = save.failures.len(),
            "recorded chapter"
        );
        Ok(ChapterUpdate { extraction, save })
    }

    /// Mark a plot thread resolved. Returns `false` if no thread has that name.
    pub async fn resolve_plot_thread(&self, name: &str, chapter: u32) -> Result<bool, PersistError> {
        self.mutate(|memory| memory.resolve_plot_thread(name, chapter, Utc::now()))
            .await
            .map(|(found, _)| found)
    }

    /// Replace the whole store with an export.
    ///
    /// The document is validated first; a rejected import changes nothing.
    pub async fn import_all(&self, data: Value) -> Result<SaveReport, ImportError> {
        let memory = MemoryExport::from_value(data)?.into_memory();
        let (_, report) = self.mutate(move |current| *current = memory).await?;
        info!("imported story memory");
        Ok(report)
    }

    pub async fn import_from_file(&self, path: impl AsRef<Path>) -> Result<SaveReport, ImportError> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let data: Value = serde_json::from_str(&content)?;
        self.import_all(data).await
    }

    /// Delete every fact in memory and on disk, backups included.
    pub async fn clear(&self) -> Result<(), PersistError> {
        let _writer = self.writer.lock().await;
        self.memory.write().await.clear();
        self.dir.wipe().await?;
        warn!(root = %self.dir.root().display(), "cleared story memory");
        Ok(())
    }
}
