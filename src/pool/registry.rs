//! Cached, write-through account registry

use crate::platform::Platform;
use crate::state::{apply_transition, Transition, TransitionOutcome, TransitionPolicy};
use crate::storage::{lock_storage, AccountRecord, NewAccount, SharedStorage, StorageResult};
use crate::{Result, WardenError};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-memory mirror of the accounts table
///
/// Every read-modify-write of a record runs under that account's async
/// lock and is written through to storage. A failed write is logged and
/// the cached record stays authoritative until the next reconciliation.
pub struct AccountRegistry {
    cache: DashMap<i64, AccountRecord>,
    locks: DashMap<i64, Arc<Mutex<()>>>,
    storage: SharedStorage,
    policy: TransitionPolicy,
    watermark: std::sync::Mutex<Option<DateTime<Utc>>>,
}

impl AccountRegistry {
    /// Creates a registry and loads every account from storage
    pub fn load(storage: SharedStorage, policy: TransitionPolicy) -> StorageResult<Self> {
        let registry = Self {
            cache: DashMap::new(),
            locks: DashMap::new(),
            storage,
            policy,
            watermark: std::sync::Mutex::new(None),
        };
        registry.full_reload()?;
        Ok(registry)
    }

    pub fn policy(&self) -> &TransitionPolicy {
        &self.policy
    }

    fn account_lock(&self, account_id: i64) -> Arc<Mutex<()>> {
        self.locks
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Inserts a new account through storage and caches it
    pub fn insert(&self, account: &NewAccount) -> Result<AccountRecord> {
        let record = lock_storage(&self.storage).insert_account(account)?;
        self.cache.insert(record.id, record.clone());
        Ok(record)
    }

    pub fn get(&self, account_id: i64) -> Option<AccountRecord> {
        self.cache.get(&account_id).map(|entry| entry.clone())
    }

    /// All cached accounts, optionally for one platform, in ascending id order
    pub fn list(&self, platform: Option<Platform>) -> Vec<AccountRecord> {
        let mut accounts: Vec<AccountRecord> = self
            .cache
            .iter()
            .filter(|entry| platform.map(|p| entry.platform == p).unwrap_or(true))
            .map(|entry| entry.value().clone())
            .collect();
        accounts.sort_by_key(|account| account.id);
        accounts
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Applies a transition to one account under its lock
    ///
    /// # Returns
    ///
    /// The updated record and what the transition changed
    pub async fn apply(
        &self,
        account_id: i64,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<(AccountRecord, TransitionOutcome)> {
        let lock = self.account_lock(account_id);
        let _guard = lock.lock().await;

        let mut record = self
            .get(account_id)
            .ok_or(WardenError::AccountNotFound(account_id))?;
        let outcome = apply_transition(&mut record, transition, &self.policy, now);

        self.write_through(&record);
        self.cache.insert(account_id, record.clone());
        Ok((record, outcome))
    }

    /// Records which proxy an account is currently bound to
    pub async fn set_bound_proxy(
        &self,
        account_id: i64,
        endpoint: Option<String>,
    ) -> Result<AccountRecord> {
        let lock = self.account_lock(account_id);
        let _guard = lock.lock().await;

        let mut record = self
            .get(account_id)
            .ok_or(WardenError::AccountNotFound(account_id))?;
        if record.bound_proxy_id == endpoint {
            return Ok(record);
        }
        record.bound_proxy_id = endpoint;
        record.updated_at = Utc::now();

        self.write_through(&record);
        self.cache.insert(account_id, record.clone());
        Ok(record)
    }

    fn write_through(&self, record: &AccountRecord) {
        if let Err(e) = lock_storage(&self.storage).update_account(record) {
            tracing::error!(
                "[AccountPool] Failed to persist account {}: {}",
                record.id,
                e
            );
        }
    }

    /// Pulls rows changed since the last sync into the cache
    ///
    /// Falls back to a full reload when no sync has happened yet.
    ///
    /// # Returns
    ///
    /// The number of cached records replaced
    pub fn sync_incremental(&self) -> StorageResult<usize> {
        let since = *self
            .watermark
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let since = match since {
            Some(since) => since,
            None => return self.full_reload(),
        };

        let rows = lock_storage(&self.storage).load_accounts_updated_since(since)?;
        Ok(self.merge(rows))
    }

    /// Reloads every row into the cache
    pub fn full_reload(&self) -> StorageResult<usize> {
        let rows = lock_storage(&self.storage).load_accounts()?;
        Ok(self.merge(rows))
    }

    /// Replaces cached records with stored rows that are at least as fresh
    ///
    /// A row whose account is mid-update is skipped, and the watermark is
    /// held below it so the next pass picks it up again.
    fn merge(&self, rows: Vec<AccountRecord>) -> usize {
        let mut newest: Option<DateTime<Utc>> = None;
        let mut oldest_skipped: Option<DateTime<Utc>> = None;
        let mut replaced = 0;

        for row in rows {
            let lock = self.account_lock(row.id);
            let _guard = match lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    tracing::debug!("[Reconciler] Account {} is busy, retrying next pass", row.id);
                    oldest_skipped = Some(match oldest_skipped {
                        Some(skipped) => skipped.min(row.updated_at),
                        None => row.updated_at,
                    });
                    continue;
                }
            };
            newest = newest.max(Some(row.updated_at));

            let unchanged = self
                .cache
                .get(&row.id)
                .map(|cached| cached.updated_at > row.updated_at || *cached == row)
                .unwrap_or(false);
            if unchanged {
                continue;
            }
            self.cache.insert(row.id, row);
            replaced += 1;
        }

        if let Some(skipped) = oldest_skipped {
            let below = skipped - Duration::microseconds(1);
            newest = newest.map(|n| n.min(below));
        }

        let mut watermark = self
            .watermark
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if newest > *watermark {
            *watermark = newest;
        }
        replaced
    }
}
