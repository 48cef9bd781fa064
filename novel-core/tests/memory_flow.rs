//! Fact store lifecycle tests: restart, corruption, backups and extraction.
//!
//! These run entirely on a temporary directory.

use novel_core::extract::ChapterDraft;
use novel_core::fact_store::FactStore;
use novel_core::memory::CharacterProfile;
use novel_core::persist::{Category, MemoryDir};
use novel_core::relevance::RelevanceEngine;
use novel_core::testing::{sample_characters, sample_chapter, sample_worldview};
use novel_core::ContextAssembler;
use tempfile::TempDir;

async fn open(dir: &MemoryDir) -> FactStore {
    FactStore::open(dir.clone()).await.expect("store opens").0
}

// =============================================================================
// Restart and corruption
// =============================================================================

#[tokio::test]
async fn test_corrupted_character_file_only_resets_characters() {
    let temp = TempDir::new().unwrap();
    let dir = MemoryDir::new(temp.path());

    let store = open(&dir).await;
    store.merge_characters(sample_characters()).await.unwrap();
    store.merge_worldview(sample_worldview()).await.unwrap();
    store.record_chapter(1, &sample_chapter(1)).await.unwrap();
    store.record_chapter(2, &sample_chapter(2)).await.unwrap();
    let before = store.snapshot().await;
    drop(store);

    std::fs::write(temp.path().join("characters").join("林风.json"), "{ not json").unwrap();

    let (reopened, warnings) = FactStore::open(dir).await.unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].category, Category::Characters);

    let after = reopened.snapshot().await;
    assert_eq!(after.character_count(), 0);
    assert_eq!(after.worldview(), before.worldview());
    assert_eq!(after.chapter_summaries(), before.chapter_summaries());
    assert_eq!(after.timeline(), before.timeline());
    assert_eq!(after.locations(), before.locations());
    assert_eq!(after.plots(), before.plots());
    assert_eq!(after.relationships(), before.relationships());
}

#[tokio::test]
async fn test_backup_retention_keeps_newest_five() {
    let temp = TempDir::new().unwrap();
    let dir = MemoryDir::new(temp.path());
    let store = open(&dir).await;

    let mut backups = Vec::new();
    for i in 0..7 {
        let report = store
            .merge_characters(vec![CharacterProfile::new(format!("角色{i}"))])
            .await
            .unwrap();
        backups.push(report.backup.expect("every save backs up first"));
    }

    let remaining = dir.list_backups().await.unwrap();
    assert_eq!(remaining.len(), 5);
    assert_eq!(remaining, backups[2..].to_vec());
}

// =============================================================================
// Extraction through the store
// =============================================================================

#[tokio::test]
async fn test_close_mention_records_one_interaction() {
    let temp = TempDir::new().unwrap();
    let store = open(&MemoryDir::new(temp.path())).await;
    store
        .merge_characters(vec![CharacterProfile::new("甲"), CharacterProfile::new("乙")])
        .await
        .unwrap();

    store
        .record_chapter(3, &ChapterDraft::new("重逢", "甲在渡口等了很久，乙终于出现。"))
        .await
        .unwrap();

    let memory = store.snapshot().await;
    let interaction = memory.relationships().get("乙", "甲").expect("pair recorded");
    assert_eq!(interaction.interaction_count, 1);
    assert_eq!(interaction.interaction_chapters, vec![3]);
}

#[tokio::test]
async fn test_reprocessing_a_chapter_duplicates_history() {
    let temp = TempDir::new().unwrap();
    let store = open(&MemoryDir::new(temp.path())).await;
    store.merge_characters(sample_characters()).await.unwrap();

    let draft = sample_chapter(4);
    let first = store.record_chapter(4, &draft).await.unwrap();
    let summary = store.snapshot().await.chapter_summary(4).cloned().unwrap();
    let second = store.record_chapter(4, &draft).await.unwrap();

    assert!(!first.extraction.summary_replaced);
    assert!(second.extraction.summary_replaced);

    let memory = store.snapshot().await;
    assert_eq!(memory.chapter_summaries().len(), 1);
    let replaced = memory.chapter_summary(4).unwrap();
    assert_eq!(replaced.summary, summary.summary);
    assert_eq!(replaced.key_events, summary.key_events);

    // Known gap: history and timeline grow on every pass.
    assert_eq!(memory.character("林风").unwrap().development_history.len(), 2);
    assert_eq!(memory.timeline().len(), 2);
}

#[tokio::test]
async fn test_unknown_development_names_are_dropped() {
    let temp = TempDir::new().unwrap();
    let store = open(&MemoryDir::new(temp.path())).await;
    store.merge_characters(sample_characters()).await.unwrap();

    let draft = ChapterDraft::new("第一章", "林风下山").with_development("无名氏", "登场");
    let update = store.record_chapter(1, &draft).await.unwrap();
    assert_eq!(update.extraction.unknown_characters, vec!["无名氏".to_string()]);
    assert!(store.snapshot().await.character("无名氏").is_none());
}

// =============================================================================
// Relevance
// =============================================================================

#[tokio::test]
async fn test_opening_chapter_context_is_deterministic() {
    let temp = TempDir::new().unwrap();
    let store = open(&MemoryDir::new(temp.path())).await;
    store
        .merge_characters(vec![
            CharacterProfile::new("主角").with_importance(10),
            CharacterProfile::new("配角").with_importance(4),
        ])
        .await
        .unwrap();

    let assembler = ContextAssembler::default();
    let first = store.assemble_context(&assembler, 1).await;
    let second = store.assemble_context(&assembler, 1).await;
    assert_eq!(first, second);

    let names: Vec<&str> = first.selection.character_names().collect();
    assert_eq!(names, vec!["主角"]);
    assert!(first.render().contains("### 主角"));
    assert!(!first.render().contains("配角"));
}

#[tokio::test]
async fn test_relevance_survives_restart() {
    let temp = TempDir::new().unwrap();
    let dir = MemoryDir::new(temp.path());
    let store = open(&dir).await;
    store.merge_characters(sample_characters()).await.unwrap();
    for chapter in 1..=6 {
        store.record_chapter(chapter, &sample_chapter(chapter)).await.unwrap();
    }

    let engine = RelevanceEngine::default();
    let before = store.read(|memory| engine.select(memory, 12)).await;
    drop(store);

    let reopened = open(&dir).await;
    let after = reopened.read(|memory| engine.select(memory, 12)).await;
    assert_eq!(before, after);
}
