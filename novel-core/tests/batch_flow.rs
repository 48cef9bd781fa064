//! Batch generation tests against the scripted generator.
//!
//! No network access; chapter content comes from `MockGenerator`.

use novel_core::batch::{BatchConfig, BatchOrchestrator, ChapterOutcome};
use novel_core::context::SUMMARIES_TITLE;
use novel_core::extract::ChapterDraft;
use novel_core::fact_store::FactStore;
use novel_core::generation::GenerationError;
use novel_core::persist::MemoryDir;
use novel_core::testing::{sample_brief, sample_characters, sample_outline, MockChapter, MockGenerator};
use novel_core::{NovelConfig, NovelProject};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn store(temp: &TempDir) -> Arc<FactStore> {
    let (store, _) = FactStore::open(MemoryDir::new(temp.path().join("memory")))
        .await
        .expect("store opens");
    store.merge_characters(sample_characters()).await.unwrap();
    Arc::new(store)
}

fn chapter_numbers(outcomes: &[ChapterOutcome]) -> Vec<u32> {
    outcomes.iter().map(ChapterOutcome::chapter_number).collect()
}

#[tokio::test]
async fn test_concurrency_never_exceeds_limit() {
    let temp = TempDir::new().unwrap();
    let generator = Arc::new(MockGenerator::new().with_latency(Duration::from_millis(50)));
    let orchestrator = BatchOrchestrator::new(generator.clone(), store(&temp).await)
        .with_config(BatchConfig::default().with_concurrency(2).with_consistency(false));

    let report = orchestrator.generate_range(&sample_outline(), 1, 6).await;
    assert_eq!(report.success_count, 6);
    assert_eq!(generator.max_in_flight(), 2);
    assert_eq!(chapter_numbers(&report.chapters), vec![1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn test_serial_generation_sees_previous_chapters() {
    let temp = TempDir::new().unwrap();
    let generator = Arc::new(MockGenerator::new());
    let orchestrator = BatchOrchestrator::new(generator.clone(), store(&temp).await)
        .with_config(BatchConfig::default().with_concurrency(1));

    let report = orchestrator.generate_range(&sample_outline(), 1, 3).await;
    assert_eq!(report.success_count, 3);
    assert_eq!(generator.requested(), vec![1, 2, 3]);

    let first = generator.context_for(1).unwrap();
    assert!(!first.contains(SUMMARIES_TITLE));

    let third = generator.context_for(3).unwrap();
    assert!(third.contains(SUMMARIES_TITLE));
    assert!(third.contains("- 第1章: "));
    assert!(third.contains("- 第2章: "));
}

#[tokio::test]
async fn test_failures_and_timeouts_are_reported_not_fatal() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp).await;
    let generator = MockGenerator::new()
        .script(2, MockChapter::Fail(GenerationError::Auth("invalid key".to_string())))
        .script(
            3,
            MockChapter::Delay(Duration::from_secs(10), ChapterDraft::new("迟到", "林风迟到了")),
        )
        .script(
            4,
            MockChapter::Fail(GenerationError::malformed("expected value", "不是JSON")),
        );
    let orchestrator = BatchOrchestrator::new(Arc::new(generator), store.clone()).with_config(
        BatchConfig::default().with_chapter_timeout(Duration::from_millis(100)),
    );

    let report = orchestrator.generate_range(&sample_outline(), 1, 5).await;
    assert_eq!(report.total_chapters, 5);
    assert_eq!((report.start_chapter, report.end_chapter), (1, 5));
    assert_eq!(report.success_count, 2);
    assert_eq!(report.failed_count, 3);

    let failed: Vec<u32> = report.failed().map(|c| c.chapter_number).collect();
    assert_eq!(failed, vec![2, 3, 4]);
    let timeout = report.failed().find(|c| c.chapter_number == 3).unwrap();
    assert_eq!(timeout.error, GenerationError::Timeout.to_string());

    let memory = store.snapshot().await;
    let recorded: Vec<u32> = memory.chapter_summaries().keys().copied().collect();
    assert_eq!(recorded, vec![1, 5]);
}

#[tokio::test]
async fn test_project_end_to_end() {
    let temp = TempDir::new().unwrap();
    let mut config = NovelConfig::default();
    config.memory.memory_dir = temp.path().join("memory");
    config.generation.output_dir = Some(temp.path().join("chapters"));
    config.generation.concurrency = 2;

    let (project, warnings) = NovelProject::open(config.clone(), Arc::new(MockGenerator::new()))
        .await
        .unwrap();
    assert!(warnings.is_empty());
    project.create(&sample_brief()).await.unwrap();

    let report = project.generate_pending(4).await.unwrap();
    assert_eq!(report.success_count, 4);
    assert!(temp.path().join("chapters").join("chapter_0004.md").exists());

    let full = project.full_check().await.unwrap();
    assert!(full.overall_score <= 100);
    assert_eq!(full.timeline.score, 100);
    drop(project);

    // A fresh project on the same directory picks up where the last one stopped.
    let (reopened, _) = NovelProject::open(config, Arc::new(MockGenerator::new()))
        .await
        .unwrap();
    let plan = reopened.plan().await.unwrap();
    assert_eq!(plan.completed(), 4);
    assert_eq!(plan.pending().first(), Some(&5));
    assert_eq!(reopened.progress().await.generated_chapters, 4);
}
