//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::proxy::ProxyBinding;
use crate::storage::{
    AccountRecord, CheckpointKey, CheckpointRecord, DedupScope, NewAccount, ProcessedItemRecord,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Account not found: {0}")]
    AccountNotFound(i64),

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(i64),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines the durable mirror of the in-memory pool state.
/// Implementations are wrapped in a mutex and shared between tasks, so
/// every method should complete quickly.
pub trait Storage: Send {
    // ===== Accounts =====

    /// Inserts a new account and returns the stored record
    ///
    /// New accounts start active with full health and zeroed counters.
    fn insert_account(&mut self, account: &NewAccount) -> StorageResult<AccountRecord>;

    /// Gets an account by ID
    fn get_account(&self, account_id: i64) -> StorageResult<Option<AccountRecord>>;

    /// Writes every mutable field of an account
    fn update_account(&mut self, account: &AccountRecord) -> StorageResult<()>;

    /// Loads all accounts ordered by ID
    fn load_accounts(&self) -> StorageResult<Vec<AccountRecord>>;

    /// Loads accounts whose `updated_at` is strictly after `since`
    ///
    /// This is used by incremental cache reconciliation.
    fn load_accounts_updated_since(&self, since: DateTime<Utc>)
        -> StorageResult<Vec<AccountRecord>>;

    // ===== Proxy Bindings =====

    /// Inserts or replaces the binding for an account
    fn save_proxy_binding(&mut self, binding: &ProxyBinding) -> StorageResult<()>;

    /// Loads all persisted bindings
    fn load_proxy_bindings(&self) -> StorageResult<Vec<ProxyBinding>>;

    /// Removes the binding for an account, if any
    fn delete_proxy_binding(&mut self, account_id: i64) -> StorageResult<()>;

    // ===== Checkpoints =====

    /// Creates a running checkpoint with zeroed counters
    fn insert_checkpoint(&mut self, key: &CheckpointKey) -> StorageResult<CheckpointRecord>;

    /// Gets a checkpoint by ID
    fn get_checkpoint(&self, checkpoint_id: i64) -> StorageResult<Option<CheckpointRecord>>;

    /// Inserts or updates a checkpoint by ID
    fn upsert_checkpoint(&mut self, checkpoint: &CheckpointRecord) -> StorageResult<()>;

    /// Finds the most recently updated running or paused checkpoint for a key
    fn find_resumable_checkpoint(
        &self,
        key: &CheckpointKey,
    ) -> StorageResult<Option<CheckpointRecord>>;

    // ===== Dedup Set =====

    /// Records a processed item
    ///
    /// # Returns
    ///
    /// `true` if the item was new, `false` if it was already present
    fn insert_processed_item(&mut self, item: &ProcessedItemRecord) -> StorageResult<bool>;

    /// Checks whether an item is in the dedup set of a scope
    fn is_item_processed(&self, scope: &DedupScope, item_id: &str) -> StorageResult<bool>;

    /// Counts the items recorded for a scope
    fn count_processed_items(&self, scope: &DedupScope) -> StorageResult<u64>;
}
