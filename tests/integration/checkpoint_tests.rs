//! Crash/resume behaviour of the checkpoint store

use crawl_warden::storage::{open_storage, shared, CheckpointKey, CrawlerType, DedupScope};
use crawl_warden::{CheckpointStatus, CheckpointStore, Platform};

fn open(path: &std::path::Path) -> CheckpointStore {
    CheckpointStore::new(shared(open_storage(path).expect("database")))
}

#[test]
fn test_resume_skips_ingested_items() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("checkpoints.db");
    let key = CheckpointKey::new(Platform::Xhs, CrawlerType::Search, Some("p1"), "matcha");

    // First run: page 1 ingests A, B, C and then the process dies
    let checkpoint_id = {
        let store = open(&db_path);
        let mut checkpoint = store.find_or_create_checkpoint(&key)?;
        let scope = DedupScope::Checkpoint(checkpoint.id);

        for item in ["A", "B", "C"] {
            assert!(!store.is_item_processed(&scope, item)?);
            store.add_processed_item(&scope, item, "note")?;
            checkpoint.total_fetched += 1;
        }
        checkpoint.current_page = 1;
        checkpoint.cursor = Some("page-2-cursor".to_string());
        store.save_checkpoint(&checkpoint)?;
        checkpoint.id
    };

    // Second run re-walks the same page, which now also holds D
    let store = open(&db_path);
    let checkpoint = store.find_or_create_checkpoint(&key)?;
    assert_eq!(checkpoint.id, checkpoint_id);
    assert_eq!(checkpoint.current_page, 1);
    assert_eq!(checkpoint.total_fetched, 3);
    assert_eq!(checkpoint.cursor.as_deref(), Some("page-2-cursor"));

    let scope = DedupScope::Checkpoint(checkpoint.id);
    let fresh = store.filter_unprocessed(&scope, &["A", "B", "C", "D"])?;
    assert_eq!(fresh, vec!["D".to_string()]);
    assert_eq!(store.processed_count(&scope)?, 3);
    Ok(())
}

#[test]
fn test_platform_scope_spans_tasks() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open(&dir.path().join("notes.db"));

    let search = store.create_checkpoint(&CheckpointKey::new(
        Platform::Douyin,
        CrawlerType::Search,
        None,
        "hotpot",
    ))?;
    let creator = store.create_checkpoint(&CheckpointKey::new(
        Platform::Douyin,
        CrawlerType::Creator,
        None,
        "creator-42",
    ))?;
    assert_ne!(search.id, creator.id);

    // Ingested by the search task, seen again by the creator task
    store.add_processed_note("v-1001", Platform::Douyin)?;
    assert!(store.is_note_processed("v-1001", Platform::Douyin)?);
    assert!(!store.is_note_processed("v-1001", Platform::Bilibili)?);

    // Checkpoint scopes stay separate
    let search_scope = DedupScope::Checkpoint(search.id);
    let creator_scope = DedupScope::Checkpoint(creator.id);
    store.add_processed_item(&search_scope, "v-2002", "video")?;
    assert!(!store.is_item_processed(&creator_scope, "v-2002")?);
    Ok(())
}

#[test]
fn test_lifecycle_to_completion() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("lifecycle.db");
    let key = CheckpointKey::new(Platform::Bilibili, CrawlerType::Detail, Some("p9"), "BV1xx");

    let store = open(&db_path);
    let checkpoint = store.find_or_create_checkpoint(&key)?;
    store.pause_checkpoint(checkpoint.id)?;

    let store = open(&db_path);
    let resumed = store.find_or_create_checkpoint(&key)?;
    assert_eq!(resumed.id, checkpoint.id);
    assert_eq!(resumed.status, CheckpointStatus::Running);

    let done = store.complete_checkpoint(resumed.id)?;
    assert_eq!(done.status, CheckpointStatus::Completed);

    // A finished task starts over on the next run
    let next = store.find_or_create_checkpoint(&key)?;
    assert_ne!(next.id, checkpoint.id);
    assert_eq!(next.status, CheckpointStatus::Running);
    Ok(())
}
