//! On-disk layout of the story memory.
//!
//! Every category is its own human-readable JSON document, so a corrupt file
//! only costs that category. Each save first snapshots the previous on-disk
//! state into a timestamped backup directory.
//!
//! ```text
//! <root>/
//!   core_settings.json
//!   worldview.json
//!   timeline.json
//!   characters/<name>.json
//!   summaries/chapter_summaries.json
//!   plots/plot_<n>.json
//!   locations/<name>.json
//!   relationships/relationship_graph.json
//!   backups/<YYYYmmdd_HHMMSS_micros>/
//! ```

use crate::memory::{
    ChapterSummary, CharacterProfile, CoreSettings, Location, NovelMemory, PlotThread,
    RelationshipGraph, TimelineEvent, WorldView,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from importing a whole-store export.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Import data must be a JSON object")]
    NotAnObject,

    #[error("Import data is missing mandatory category '{0}'")]
    MissingCategory(&'static str),

    #[error("Invalid import data: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),
}

const CORE_SETTINGS_FILE: &str = "core_settings.json";
const WORLDVIEW_FILE: &str = "worldview.json";
const TIMELINE_FILE: &str = "timeline.json";
const CHARACTERS_DIR: &str = "characters";
const SUMMARIES_DIR: &str = "summaries";
const SUMMARIES_FILE: &str = "chapter_summaries.json";
const PLOTS_DIR: &str = "plots";
const LOCATIONS_DIR: &str = "locations";
const RELATIONSHIPS_DIR: &str = "relationships";
const RELATIONSHIPS_FILE: &str = "relationship_graph.json";
const BACKUPS_DIR: &str = "backups";

const BACKUP_STAMP: &str = "%Y%m%d_%H%M%S_%6f";

/// Backups kept by default.
pub const DEFAULT_BACKUP_RETENTION: usize = 5;

/// Current export format version.
pub const EXPORT_VERSION: &str = "1.0";

/// Categories an import must contain.
const MANDATORY_CATEGORIES: [&str; 4] = ["core_settings", "characters", "worldview", "chapter_summaries"];

/// A persisted category of facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    CoreSettings,
    Characters,
    Worldview,
    ChapterSummaries,
    Timeline,
    Plots,
    Locations,
    Relationships,
}

impl Category {
    pub fn name(&self) -> &'static str {
        match self {
            Category::CoreSettings => "core_settings",
            Category::Characters => "characters",
            Category::Worldview => "worldview",
            Category::ChapterSummaries => "chapter_summaries",
            Category::Timeline => "timeline",
            Category::Plots => "plots",
            Category::Locations => "locations",
            Category::Relationships => "relationships",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A category that could not be loaded and was reset to empty.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadWarning {
    pub category: Category,
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} reset to empty ({}: {})",
            self.category,
            self.path.display(),
            self.reason
        )
    }
}

/// A category that failed to save.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryFailure {
    pub category: Category,
    pub reason: String,
}

/// What happened during one save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveReport {
    /// Snapshot of the state that was on disk before this save.
    pub backup: Option<PathBuf>,
    pub backup_error: Option<String>,
    pub failures: Vec<CategoryFailure>,
}

impl SaveReport {
    /// Whether the backup and every category were written.
    pub fn is_complete(&self) -> bool {
        self.backup_error.is_none() && self.failures.is_empty()
    }
}

/// The directory a project's memory lives in.
#[derive(Debug, Clone)]
pub struct MemoryDir {
    root: PathBuf,
    backup_retention: usize,
}

impl MemoryDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            backup_retention: DEFAULT_BACKUP_RETENTION,
        }
    }

    /// Keep `retention` backups (at least one).
    pub fn with_backup_retention(mut self, retention: usize) -> Self {
        self.backup_retention = retention.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join(BACKUPS_DIR)
    }

    /// Create the root and every category directory.
    pub async fn ensure_layout(&self) -> Result<(), PersistError> {
        fs::create_dir_all(&self.root).await?;
        for dir in [
            CHARACTERS_DIR,
            SUMMARIES_DIR,
            PLOTS_DIR,
            LOCATIONS_DIR,
            RELATIONSHIPS_DIR,
            BACKUPS_DIR,
        ] {
            fs::create_dir_all(self.root.join(dir)).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Load every category.
    ///
    /// A missing record loads as empty. An unreadable or empty record resets
    /// only its own category and produces a warning.
    pub async fn load(&self) -> Result<(NovelMemory, Vec<LoadWarning>), PersistError> {
        self.ensure_layout().await?;
        let mut warnings = Vec::new();

        let core_settings: CoreSettings = self
            .load_file(Category::CoreSettings, self.root.join(CORE_SETTINGS_FILE), &mut warnings)
            .await;
        let worldview: WorldView = self
            .load_file(Category::Worldview, self.root.join(WORLDVIEW_FILE), &mut warnings)
            .await;
        let chapter_summaries: BTreeMap<u32, ChapterSummary> = self
            .load_file(
                Category::ChapterSummaries,
                self.root.join(SUMMARIES_DIR).join(SUMMARIES_FILE),
                &mut warnings,
            )
            .await;
        let timeline: Vec<TimelineEvent> = self
            .load_file(Category::Timeline, self.root.join(TIMELINE_FILE), &mut warnings)
            .await;
        let relationships: RelationshipGraph = self
            .load_file(
                Category::Relationships,
                self.root.join(RELATIONSHIPS_DIR).join(RELATIONSHIPS_FILE),
                &mut warnings,
            )
            .await;

        let characters: Vec<CharacterProfile> = self
            .load_dir(Category::Characters, CHARACTERS_DIR, &mut warnings)
            .await;
        let plots: Vec<PlotThread> = self
            .load_dir(Category::Plots, PLOTS_DIR, &mut warnings)
            .await;
        let locations: Vec<Location> = self
            .load_dir(Category::Locations, LOCATIONS_DIR, &mut warnings)
            .await;

        let memory = NovelMemory {
            core_settings,
            characters: characters
                .into_iter()
                .map(|c| (c.name.clone(), c))
                .collect(),
            worldview,
            chapter_summaries,
            timeline,
            plots,
            locations: locations
                .into_iter()
                .map(|l| (l.name.clone(), l))
                .collect(),
            relationships,
        };

        info!(
            root = %self.root.display(),
            characters = memory.character_count(),
            chapters = memory.chapter_summaries().len(),
            warnings = warnings.len(),
            "loaded story memory"
        );

        Ok((memory, warnings))
    }

    async fn load_file<T: DeserializeOwned + Default>(
        &self,
        category: Category,
        path: PathBuf,
        warnings: &mut Vec<LoadWarning>,
    ) -> T {
        match read_record(&path).await {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(reason) => {
                warn!(%category, path = %path.display(), %reason, "resetting unreadable category");
                warnings.push(LoadWarning {
                    category,
                    path,
                    reason,
                });
                T::default()
            }
        }
    }

    async fn load_dir<T: DeserializeOwned>(
        &self,
        category: Category,
        dir: &str,
        warnings: &mut Vec<LoadWarning>,
    ) -> Vec<T> {
        let dir = self.root.join(dir);
        let paths = match json_files(&dir).await {
            Ok(paths) => paths,
            Err(e) => {
                warn!(%category, error = %e, "cannot list category directory");
                warnings.push(LoadWarning {
                    category,
                    path: dir,
                    reason: e.to_string(),
                });
                return Vec::new();
            }
        };

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            match read_record(&path).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(reason) => {
                    warn!(%category, path = %path.display(), %reason, "resetting unreadable category");
                    warnings.push(LoadWarning {
                        category,
                        path,
                        reason,
                    });
                    return Vec::new();
                }
            }
        }
        records
    }

    // =========================================================================
    // Saving
    // =========================================================================

    /// Back up the current on-disk state, then write every category.
    ///
    /// A failing category is reported and does not stop the others.
    pub async fn save(&self, memory: &NovelMemory) -> Result<SaveReport, PersistError> {
        self.ensure_layout().await?;
        let mut report = SaveReport::default();

        match self.backup().await {
            Ok(path) => report.backup = Some(path),
            Err(e) => {
                warn!(error = %e, "backup before save failed");
                report.backup_error = Some(e.to_string());
            }
        }

        let root = &self.root;
        note_failure(
            &mut report,
            Category::CoreSettings,
            write_json(&root.join(CORE_SETTINGS_FILE), &memory.core_settings).await,
        );
        note_failure(
            &mut report,
            Category::Worldview,
            write_json(&root.join(WORLDVIEW_FILE), &memory.worldview).await,
        );
        note_failure(
            &mut report,
            Category::ChapterSummaries,
            write_json(
                &root.join(SUMMARIES_DIR).join(SUMMARIES_FILE),
                &memory.chapter_summaries,
            )
            .await,
        );
        note_failure(
            &mut report,
            Category::Timeline,
            write_json(&root.join(TIMELINE_FILE), &memory.timeline).await,
        );
        note_failure(
            &mut report,
            Category::Relationships,
            write_json(
                &root.join(RELATIONSHIPS_DIR).join(RELATIONSHIPS_FILE),
                &memory.relationships,
            )
            .await,
        );
        note_failure(
            &mut report,
            Category::Characters,
            write_dir(
                &root.join(CHARACTERS_DIR),
                memory
                    .characters
                    .values()
                    .map(|c| (sanitize_name(&c.name), c))
                    .collect(),
            )
            .await,
        );
        note_failure(
            &mut report,
            Category::Plots,
            write_dir(
                &root.join(PLOTS_DIR),
                memory
                    .plots
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (format!("plot_{}", i + 1), p))
                    .collect(),
            )
            .await,
        );
        note_failure(
            &mut report,
            Category::Locations,
            write_dir(
                &root.join(LOCATIONS_DIR),
                memory
                    .locations
                    .values()
                    .map(|l| (sanitize_name(&l.name), l))
                    .collect(),
            )
            .await,
        );

        debug!(
            root = %root.display(),
            failures = report.failures.len(),
            "saved story memory"
        );
        Ok(report)
    }

    // =========================================================================
    // Backups
    // =========================================================================

    /// Copy everything except the backups directory into a new timestamped backup.
    pub async fn backup(&self) -> Result<PathBuf, PersistError> {
        let backups = self.backups_dir();
        fs::create_dir_all(&backups).await?;

        let stamp = Utc::now().format(BACKUP_STAMP).to_string();
        let mut target = backups.join(&stamp);
        let mut suffix = 1;
        while fs::try_exists(&target).await? {
            target = backups.join(format!("{stamp}_{suffix}"));
            suffix += 1;
        }
        fs::create_dir_all(&target).await?;

        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name() == BACKUPS_DIR {
                continue;
            }
            copy_recursive(&entry.path(), &target.join(entry.file_name())).await?;
        }

        self.prune_backups().await?;
        Ok(target)
    }

    /// Backup directories, oldest first.
    pub async fn list_backups(&self) -> Result<Vec<PathBuf>, PersistError> {
        let mut backups = Vec::new();
        let mut entries = match fs::read_dir(self.backups_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(backups),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                backups.push(entry.path());
            }
        }
        backups.sort();
        Ok(backups)
    }

    async fn prune_backups(&self) -> Result<(), PersistError> {
        let backups = self.list_backups().await?;
        let excess = backups.len().saturating_sub(self.backup_retention);
        for old in backups.into_iter().take(excess) {
            debug!(path = %old.display(), "pruning backup");
            fs::remove_dir_all(old).await?;
        }
        Ok(())
    }

    /// Delete everything on disk, backups included, and recreate the empty layout.
    pub async fn wipe(&self) -> Result<(), PersistError> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.ensure_layout().await
    }
}

fn note_failure(report: &mut SaveReport, category: Category, result: Result<(), PersistError>) {
    if let Err(e) = result {
        warn!(%category, error = %e, "failed to save category");
        report.failures.push(CategoryFailure {
            category,
            reason: e.to_string(),
        });
    }
}

/// File-name-safe form of an entity name.
///
/// Keeps alphanumerics of any script plus space, `_` and `-`.
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();
    let sanitized = sanitized.trim();
    if sanitized.is_empty() {
        "unnamed".to_string()
    } else {
        sanitized.to_string()
    }
}

async fn read_record<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, String> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.to_string()),
    };
    if content.trim().is_empty() {
        return Err("empty record".to_string());
    }
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| e.to_string())
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PersistError> {
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content).await?;
    Ok(())
}

/// Write one file per record and remove files no record claimed.
async fn write_dir<T: Serialize + Sync>(dir: &Path, records: Vec<(String, &T)>) -> Result<(), PersistError> {
    fs::create_dir_all(dir).await?;
    let mut claimed = BTreeSet::new();
    let mut first_error = None;

    for (stem, record) in records {
        let mut file = format!("{stem}.json");
        let mut n = 2;
        while claimed.contains(&file) {
            file = format!("{stem}_{n}.json");
            n += 1;
        }
        if let Err(e) = write_json(&dir.join(&file), record).await {
            first_error.get_or_insert(e);
        }
        claimed.insert(file);
    }

    for path in json_files(dir).await? {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if !claimed.contains(&name) {
            fs::remove_file(&path).await?;
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// `.json` files in `dir`, in natural order (`plot_2` before `plot_10`).
async fn json_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            files.push(path);
        }
    }
    files.sort_by_key(|p| natural_key(p));
    Ok(files)
}

fn natural_key(path: &Path) -> (String, u64, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let digits_at = stem.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let (prefix, digits) = stem.split_at(digits_at);
    let number = digits.parse().unwrap_or(0);
    (prefix.to_string(), number, stem.clone())
}

async fn copy_recursive(src: &Path, dst: &Path) -> Result<(), PersistError> {
    let mut pending = vec![(src.to_path_buf(), dst.to_path_buf())];
    while let Some((from, to)) = pending.pop() {
        if fs::metadata(&from).await?.is_dir() {
            fs::create_dir_all(&to).await?;
            let mut entries = fs::read_dir(&from).await?;
            while let Some(entry) = entries.next_entry().await? {
                pending.push((entry.path(), to.join(entry.file_name())));
            }
        } else {
            fs::copy(&from, &to).await?;
        }
    }
    Ok(())
}

// ============================================================================
// Export / Import
// ============================================================================

fn export_version() -> String {
    EXPORT_VERSION.to_string()
}

/// The whole store as a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryExport {
    #[serde(default = "export_version")]
    pub version: String,
    #[serde(default)]
    pub export_time: Option<DateTime<Utc>>,
    pub core_settings: CoreSettings,
    pub characters: BTreeMap<String, CharacterProfile>,
    pub worldview: WorldView,
    pub chapter_summaries: BTreeMap<u32, ChapterSummary>,
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,
    #[serde(default)]
    pub plots: Vec<PlotThread>,
    #[serde(default)]
    pub locations: BTreeMap<String, Location>,
    #[serde(default)]
    pub relationships: RelationshipGraph,
}

impl MemoryExport {
    pub fn from_memory(memory: &NovelMemory, now: DateTime<Utc>) -> Self {
        Self {
            version: EXPORT_VERSION.to_string(),
            export_time: Some(now),
            core_settings: memory.core_settings.clone(),
            characters: memory.characters.clone(),
            worldview: memory.worldview.clone(),
            chapter_summaries: memory.chapter_summaries.clone(),
            timeline: memory.timeline.clone(),
            plots: memory.plots.clone(),
            locations: memory.locations.clone(),
            relationships: memory.relationships.clone(),
        }
    }

    /// Validate and parse an import document.
    ///
    /// All four mandatory categories must be present before anything is parsed.
    pub fn from_value(value: Value) -> Result<Self, ImportError> {
        let object = value.as_object().ok_or(ImportError::NotAnObject)?;
        if let Some(missing) = MANDATORY_CATEGORIES
            .iter()
            .find(|key| !object.contains_key(**key))
        {
            return Err(ImportError::MissingCategory(missing));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn into_memory(self) -> NovelMemory {
        NovelMemory {
            core_settings: self.core_settings,
            characters: self
                .characters
                .into_values()
                .map(|c| (c.name.clone(), c))
                .collect(),
            worldview: self.worldview,
            chapter_summaries: self.chapter_summaries,
            timeline: self.timeline,
            plots: self.plots,
            locations: self.locations,
            relationships: self.relationships,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{CharacterPair, TimelineEvent};
    use tempfile::TempDir;

    fn sample_memory() -> NovelMemory {
        let now = Utc::now();
        let mut memory = NovelMemory::new();
        memory.update_core_settings(vec![("title".to_string(), Value::from("山海行"))]);
        memory.merge_characters(
            vec![
                CharacterProfile::new("林风").with_personality("沉默寡言"),
                CharacterProfile::new("苏/雪").with_importance(7),
            ],
            now,
        );
        memory.merge_worldview(
            WorldView {
                basic_setting: "九州大陆".to_string(),
                ..Default::default()
            },
            now,
        );
        memory.record_summary(ChapterSummary {
            chapter_number: 1,
            summary: "林风下山".to_string(),
            word_count: 3000,
            key_events: vec!["下山".to_string(), "遇险".to_string()],
            timestamp: now,
        });
        memory.push_event(TimelineEvent::chapter_event(1, "下山", now));
        memory.note_location("青云山", 1, now);
        memory.fold_into_plots(1, &["下山".to_string(), "遇险".to_string()], now);
        memory.record_interaction(CharacterPair::new("林风", "苏/雪"), 1);
        memory
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("林风"), "林风");
        assert_eq!(sanitize_name("苏/雪"), "苏雪");
        assert_eq!(sanitize_name(" Old Tom_2-a "), "Old Tom_2-a");
        assert_eq!(sanitize_name("../"), "unnamed");
    }

    #[test]
    fn test_natural_order() {
        let mut names = vec!["plot_10.json", "plot_2.json", "plot_1.json"];
        names.sort_by_key(|n| natural_key(Path::new(n)));
        assert_eq!(names, vec!["plot_1.json", "plot_2.json", "plot_10.json"]);
    }

    #[test]
    fn test_natural_order_with_cjk_names() {
        assert_eq!(
            natural_key(Path::new("苏雪.json")),
            ("苏雪".to_string(), 0, "苏雪".to_string())
        );
        assert_eq!(
            natural_key(Path::new("雪2.json")),
            ("雪".to_string(), 2, "雪2".to_string())
        );

        let mut names = vec!["苏雪.json", "plot_10.json", "plot_2.json"];
        names.sort_by_key(|n| natural_key(Path::new(n)));
        assert_eq!(names, vec!["plot_2.json", "plot_10.json", "苏雪.json"]);
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let dir = MemoryDir::new(temp.path().join("memory"));
        let memory = sample_memory();

        let report = dir.save(&memory).await.unwrap();
        assert!(report.is_complete());
        assert!(temp.path().join("memory/characters/苏雪.json").exists());
        assert!(temp.path().join("memory/plots/plot_1.json").exists());

        let (loaded, warnings) = dir.load().await.unwrap();
        assert!(warnings.is_empty());
        assert_eq!(loaded, memory);
    }

    #[tokio::test]
    async fn test_summaries_keyed_by_chapter_text() {
        let temp = TempDir::new().unwrap();
        let dir = MemoryDir::new(temp.path());
        dir.save(&sample_memory()).await.unwrap();

        let raw = std::fs::read_to_string(temp.path().join("summaries/chapter_summaries.json")).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["1"]["summary"], "林风下山");
    }

    #[tokio::test]
    async fn test_backup_retention() {
        let temp = TempDir::new().unwrap();
        let dir = MemoryDir::new(temp.path());
        let memory = sample_memory();

        let mut created = Vec::new();
        for _ in 0..7 {
            let report = dir.save(&memory).await.unwrap();
            created.push(report.backup.unwrap());
        }

        let remaining = dir.list_backups().await.unwrap();
        assert_eq!(remaining.len(), DEFAULT_BACKUP_RETENTION);
        assert_eq!(remaining, created[2..].to_vec());
    }

    #[tokio::test]
    async fn test_backup_holds_previous_state() {
        let temp = TempDir::new().unwrap();
        let dir = MemoryDir::new(temp.path());
        let mut memory = sample_memory();
        dir.save(&memory).await.unwrap();

        memory.update_core_settings(vec![("title".to_string(), Value::from("新书名"))]);
        let report = dir.save(&memory).await.unwrap();

        let backup = report.backup.unwrap();
        let old: Value = serde_json::from_str(
            &std::fs::read_to_string(backup.join(CORE_SETTINGS_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(old["title"], "山海行");
        assert!(!backup.join(BACKUPS_DIR).exists());
    }

    #[tokio::test]
    async fn test_corrupt_character_file_is_isolated() {
        let temp = TempDir::new().unwrap();
        let dir = MemoryDir::new(temp.path());
        let memory = sample_memory();
        dir.save(&memory).await.unwrap();

        std::fs::write(temp.path().join("characters/林风.json"), "{ not json").unwrap();

        let (loaded, warnings) = dir.load().await.unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].category, Category::Characters);
        assert_eq!(loaded.character_count(), 0);
        assert_eq!(loaded.core_settings(), memory.core_settings());
        assert_eq!(loaded.worldview(), memory.worldview());
        assert_eq!(loaded.chapter_summaries(), memory.chapter_summaries());
        assert_eq!(loaded.timeline(), memory.timeline());
        assert_eq!(loaded.plots(), memory.plots());
        assert_eq!(loaded.locations(), memory.locations());
        assert_eq!(loaded.relationships(), memory.relationships());
    }

    #[tokio::test]
    async fn test_empty_record_warns() {
        let temp = TempDir::new().unwrap();
        let dir = MemoryDir::new(temp.path());
        dir.save(&sample_memory()).await.unwrap();
        std::fs::write(temp.path().join(WORLDVIEW_FILE), "  ").unwrap();

        let (loaded, warnings) = dir.load().await.unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].category, Category::Worldview);
        assert!(loaded.worldview().is_empty());
        assert_eq!(loaded.character_count(), 2);
    }

    #[tokio::test]
    async fn test_stale_records_are_removed() {
        let temp = TempDir::new().unwrap();
        let dir = MemoryDir::new(temp.path());
        dir.save(&sample_memory()).await.unwrap();

        let mut smaller = NovelMemory::new();
        smaller.merge_characters(vec![CharacterProfile::new("林风")], Utc::now());
        dir.save(&smaller).await.unwrap();

        let (loaded, _) = dir.load().await.unwrap();
        assert_eq!(loaded.character_count(), 1);
        assert!(loaded.plots().is_empty());
        assert!(loaded.locations().is_empty());
    }

    #[tokio::test]
    async fn test_wipe_resets_layout() {
        let temp = TempDir::new().unwrap();
        let dir = MemoryDir::new(temp.path().join("memory"));
        dir.save(&sample_memory()).await.unwrap();

        dir.wipe().await.unwrap();
        let (loaded, warnings) = dir.load().await.unwrap();
        assert!(warnings.is_empty());
        assert_eq!(loaded, NovelMemory::new());
        assert!(dir.list_backups().await.unwrap().is_empty());
    }

    #[test]
    fn test_import_requires_mandatory_categories() {
        let export = MemoryExport::from_memory(&sample_memory(), Utc::now());
        let mut value = serde_json::to_value(&export).unwrap();
        value.as_object_mut().unwrap().remove("worldview");

        let err = MemoryExport::from_value(value).unwrap_err();
        assert!(matches!(err, ImportError::MissingCategory("worldview")));
        assert!(matches!(
            MemoryExport::from_value(Value::from("nope")),
            Err(ImportError::NotAnObject)
        ));
    }

    #[test]
    fn test_export_round_trip() {
        let memory = sample_memory();
        let export = MemoryExport::from_memory(&memory, Utc::now());
        let value = serde_json::to_value(&export).unwrap();
        assert_eq!(value["version"], EXPORT_VERSION);

        let back = MemoryExport::from_value(value).unwrap().into_memory();
        assert_eq!(back, memory);
    }
}
