//! Checkpoint and resume module
//!
//! This module persists crawl progress so an interrupted crawl resumes where
//! it stopped:
//! - One checkpoint per (platform, crawler type, project, key) task
//! - Validated status transitions (running, paused, completed, failed)
//! - A dedup set of processed items, scoped per checkpoint or per platform
//!
//! A resumed crawl re-walks the page it was on and skips the items that
//! were already ingested.

use crate::platform::Platform;
use crate::state::CheckpointStatus;
use crate::storage::{
    lock_storage, CheckpointKey, CheckpointRecord, DedupScope, ProcessedItemRecord, SharedStorage,
};
use crate::{Result, WardenError};
use chrono::Utc;

/// Item type recorded by the platform-scoped note helpers
const NOTE_ITEM_TYPE: &str = "note";

/// Durable crawl progress and the processed-item dedup set
#[derive(Clone)]
pub struct CheckpointStore {
    storage: SharedStorage,
}

impl CheckpointStore {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    // ===== Checkpoints =====

    /// Returns the most recent running or paused checkpoint for a task
    pub fn find_matching_checkpoint(&self, key: &CheckpointKey) -> Result<Option<CheckpointRecord>> {
        Ok(lock_storage(&self.storage).find_resumable_checkpoint(key)?)
    }

    /// Starts a new running checkpoint with zeroed counters
    pub fn create_checkpoint(&self, key: &CheckpointKey) -> Result<CheckpointRecord> {
        let checkpoint = lock_storage(&self.storage).insert_checkpoint(key)?;
        tracing::info!(
            "[Checkpoint] Created checkpoint {} for {} {} '{}'",
            checkpoint.id,
            key.platform,
            key.crawler_type.to_db_string(),
            key.key
        );
        Ok(checkpoint)
    }

    /// Resumes the task's checkpoint, or starts one
    ///
    /// A paused checkpoint is switched back to running. The lookup and the
    /// insert run under one storage lock, so concurrent callers for the same
    /// task share a single checkpoint.
    pub fn find_or_create_checkpoint(&self, key: &CheckpointKey) -> Result<CheckpointRecord> {
        let mut storage = lock_storage(&self.storage);
        let mut checkpoint = match storage.find_resumable_checkpoint(key)? {
            Some(checkpoint) => checkpoint,
            None => {
                let checkpoint = storage.insert_checkpoint(key)?;
                tracing::info!(
                    "[Checkpoint] Created checkpoint {} for {} {} '{}'",
                    checkpoint.id,
                    key.platform,
                    key.crawler_type.to_db_string(),
                    key.key
                );
                return Ok(checkpoint);
            }
        };

        tracing::info!(
            "[Checkpoint] Resuming checkpoint {} at page {} ({} fetched)",
            checkpoint.id,
            checkpoint.current_page,
            checkpoint.total_fetched
        );
        if checkpoint.status == CheckpointStatus::Paused {
            checkpoint.status = CheckpointStatus::Running;
            checkpoint.updated_at = Utc::now();
            storage.upsert_checkpoint(&checkpoint)?;
        }
        Ok(checkpoint)
    }

    pub fn get_checkpoint(&self, checkpoint_id: i64) -> Result<Option<CheckpointRecord>> {
        Ok(lock_storage(&self.storage).get_checkpoint(checkpoint_id)?)
    }

    /// Upserts a checkpoint, refreshing `updated_at`
    ///
    /// Safe to call once per page. A status that cannot follow the stored
    /// status is rejected with [`WardenError::InvalidTransition`].
    pub fn save_checkpoint(&self, checkpoint: &CheckpointRecord) -> Result<CheckpointRecord> {
        let mut storage = lock_storage(&self.storage);

        if let Some(stored) = storage.get_checkpoint(checkpoint.id)? {
            if !stored.status.can_transition_to(checkpoint.status) {
                tracing::warn!(
                    "[Checkpoint] Rejected {} -> {} for checkpoint {}",
                    stored.status,
                    checkpoint.status,
                    checkpoint.id
                );
                return Err(WardenError::InvalidTransition {
                    from: stored.status,
                    to: checkpoint.status,
                });
            }
        }

        let mut saved = checkpoint.clone();
        saved.updated_at = Utc::now();
        if let Err(e) = storage.upsert_checkpoint(&saved) {
            tracing::error!(
                "[Checkpoint] Failed to save checkpoint {}: {}",
                checkpoint.id,
                e
            );
            return Err(e.into());
        }
        Ok(saved)
    }

    /// Marks a checkpoint completed
    pub fn complete_checkpoint(&self, checkpoint_id: i64) -> Result<CheckpointRecord> {
        let saved = self.set_status(checkpoint_id, CheckpointStatus::Completed, None)?;
        tracing::info!(
            "[Checkpoint] Completed checkpoint {} ({} fetched, {} errors)",
            saved.id,
            saved.total_fetched,
            saved.total_errors
        );
        Ok(saved)
    }

    /// Marks a checkpoint failed, keeping the error message
    pub fn fail_checkpoint(&self, checkpoint_id: i64, message: &str) -> Result<CheckpointRecord> {
        let saved = self.set_status(
            checkpoint_id,
            CheckpointStatus::Failed,
            Some(message.to_string()),
        )?;
        tracing::warn!("[Checkpoint] Checkpoint {} failed: {}", saved.id, message);
        Ok(saved)
    }

    /// Pauses a checkpoint so a later run can resume it
    pub fn pause_checkpoint(&self, checkpoint_id: i64) -> Result<CheckpointRecord> {
        self.set_status(checkpoint_id, CheckpointStatus::Paused, None)
    }

    fn set_status(
        &self,
        checkpoint_id: i64,
        status: CheckpointStatus,
        error_message: Option<String>,
    ) -> Result<CheckpointRecord> {
        let mut checkpoint = self
            .get_checkpoint(checkpoint_id)?
            .ok_or(WardenError::CheckpointNotFound(checkpoint_id))?;
        checkpoint.status = status;
        if error_message.is_some() {
            checkpoint.error_message = error_message;
        }
        self.save_checkpoint(&checkpoint)
    }

    // ===== Dedup set =====

    /// Checks whether an item was already ingested on a platform
    pub fn is_note_processed(&self, item_id: &str, platform: Platform) -> Result<bool> {
        self.is_item_processed(&DedupScope::Platform(platform), item_id)
    }

    /// Records an item as ingested on a platform
    ///
    /// Call this right after the item has been persisted downstream.
    pub fn add_processed_note(&self, item_id: &str, platform: Platform) -> Result<bool> {
        self.add_processed_item(&DedupScope::Platform(platform), item_id, NOTE_ITEM_TYPE)
    }

    pub fn is_item_processed(&self, scope: &DedupScope, item_id: &str) -> Result<bool> {
        Ok(lock_storage(&self.storage).is_item_processed(scope, item_id)?)
    }

    /// Records an item in a scope's dedup set
    ///
    /// # Returns
    ///
    /// `true` if the item was new to the scope
    pub fn add_processed_item(
        &self,
        scope: &DedupScope,
        item_id: &str,
        item_type: &str,
    ) -> Result<bool> {
        let item = ProcessedItemRecord {
            scope: *scope,
            item_id: item_id.to_string(),
            item_type: item_type.to_string(),
            processed_at: Utc::now(),
        };
        Ok(lock_storage(&self.storage).insert_processed_item(&item)?)
    }

    /// Returns, in page order, the items not yet in the scope's dedup set
    pub fn filter_unprocessed<S: AsRef<str>>(
        &self,
        scope: &DedupScope,
        item_ids: &[S],
    ) -> Result<Vec<String>> {
        let storage = lock_storage(&self.storage);
        let mut unprocessed = Vec::new();
        for item_id in item_ids {
            if !storage.is_item_processed(scope, item_id.as_ref())? {
                unprocessed.push(item_id.as_ref().to_string());
            }
        }
        Ok(unprocessed)
    }

    pub fn processed_count(&self, scope: &DedupScope) -> Result<u64> {
        Ok(lock_storage(&self.storage).count_processed_items(scope)?)
    }
}
