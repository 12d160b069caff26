//! Storage module for persisting pool and crawl state
//!
//! This module handles all database operations for the layer, including:
//! - SQLite database initialization and schema management
//! - Account records and their health/usage counters
//! - Account → proxy bindings
//! - Crawl checkpoints and the processed-item dedup set

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{init_database, SqliteStorage};
pub use traits::{Storage, StorageError, StorageResult};

use crate::platform::Platform;
use crate::state::{AccountStatus, CheckpointStatus};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage handle shared by every service in the crate
pub type SharedStorage = Arc<Mutex<dyn Storage>>;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Wraps a storage backend into the shared handle the services expect
pub fn shared<S: Storage + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Locks the shared storage, recovering the guard if a writer panicked
///
/// Every write is a single statement or transaction, so a poisoned lock
/// never guards a half-applied change.
pub fn lock_storage(storage: &SharedStorage) -> MutexGuard<'_, dyn Storage + 'static> {
    storage.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Represents a crawl account in the database
#[derive(Clone, PartialEq)]
pub struct AccountRecord {
    pub id: i64,
    pub platform: Platform,
    pub name: String,
    /// Opaque credential blob (cookie string, token, ...). Never logged.
    pub credential: String,
    pub status: AccountStatus,
    pub status_reason: Option<String>,
    pub health_score: u8,
    pub use_count: u64,
    /// Uses on the calendar day of `last_used`
    pub daily_use_count: u32,
    pub success_count: u64,
    pub fail_count: u64,
    pub consecutive_fails: u32,
    pub last_used: Option<DateTime<Utc>>,
    pub last_check: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub group: Option<String>,
    pub tags: Vec<String>,
    pub bound_proxy_id: Option<String>,
    pub last_project_id: Option<String>,
    pub owning_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountRecord {
    /// Returns true if the account must not be selected at `now`
    pub fn is_cooling_down_at(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.map(|until| until > now).unwrap_or(false)
    }

    /// Returns the number of uses counted against the calendar day of `now`
    ///
    /// The stored counter belongs to the day of `last_used`; on any other day
    /// the account has not been used yet.
    pub fn daily_usage_at(&self, now: DateTime<Utc>) -> u32 {
        match self.last_used {
            Some(last) if last.date_naive() == now.date_naive() => self.daily_use_count,
            _ => 0,
        }
    }

    /// Short SHA-256 fingerprint of the credential, safe to log
    pub fn credential_fingerprint(&self) -> String {
        credential_fingerprint(&self.credential)
    }
}

impl fmt::Debug for AccountRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountRecord")
            .field("id", &self.id)
            .field("platform", &self.platform)
            .field("name", &self.name)
            .field("credential", &self.credential_fingerprint())
            .field("status", &self.status)
            .field("health_score", &self.health_score)
            .field("use_count", &self.use_count)
            .field("consecutive_fails", &self.consecutive_fails)
            .field("cooldown_until", &self.cooldown_until)
            .field("last_project_id", &self.last_project_id)
            .finish_non_exhaustive()
    }
}

/// Hashes a credential into a 12-character hex fingerprint
pub fn credential_fingerprint(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    hex::encode(&digest[..6])
}

/// Payload for the operator/import action that creates an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub platform: Platform,
    pub name: String,
    pub credential: String,
    pub group: Option<String>,
    pub tags: Vec<String>,
    pub owning_user_id: Option<String>,
}

impl NewAccount {
    pub fn new(platform: Platform, name: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            platform,
            name: name.into(),
            credential: credential.into(),
            group: None,
            tags: Vec::new(),
            owning_user_id: None,
        }
    }

    pub fn with_owner(mut self, user_id: impl Into<String>) -> Self {
        self.owning_user_id = Some(user_id.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Kind of crawl a checkpoint tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlerType {
    /// Keyword search
    Search,
    /// A list of specified item ids
    Detail,
    /// A creator's published items
    Creator,
    /// The platform home feed
    Homefeed,
}

impl CrawlerType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Detail => "detail",
            Self::Creator => "creator",
            Self::Homefeed => "homefeed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "search" => Some(Self::Search),
            "detail" => Some(Self::Detail),
            "creator" => Some(Self::Creator),
            "homefeed" => Some(Self::Homefeed),
            _ => None,
        }
    }
}

/// Identity of a crawl task: (platform, crawler type, project, keyword/id key)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointKey {
    pub platform: Platform,
    pub crawler_type: CrawlerType,
    pub project_id: Option<String>,
    pub key: String,
}

impl CheckpointKey {
    pub fn new(
        platform: Platform,
        crawler_type: CrawlerType,
        project_id: Option<&str>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            crawler_type,
            project_id: project_id.map(str::to_string),
            key: key.into(),
        }
    }
}

/// Represents the progress of one crawl task
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointRecord {
    pub id: i64,
    pub platform: Platform,
    pub crawler_type: CrawlerType,
    pub project_id: Option<String>,
    pub key: String,
    pub current_page: u32,
    pub cursor: Option<String>,
    pub total_fetched: u64,
    pub total_comments: u64,
    pub total_errors: u64,
    pub status: CheckpointStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl CheckpointRecord {
    /// Returns the (platform, crawler type, project, key) tuple
    pub fn key(&self) -> CheckpointKey {
        CheckpointKey {
            platform: self.platform,
            crawler_type: self.crawler_type,
            project_id: self.project_id.clone(),
            key: self.key.clone(),
        }
    }
}

/// Namespace of the processed-item dedup set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DedupScope {
    /// Items processed by one checkpoint
    Checkpoint(i64),
    /// Items processed anywhere on a platform
    Platform(Platform),
}

impl DedupScope {
    pub fn to_db_string(&self) -> String {
        match self {
            Self::Checkpoint(id) => format!("checkpoint:{}", id),
            Self::Platform(platform) => format!("platform:{}", platform.as_str()),
        }
    }
}

/// Represents one processed item in the dedup set
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedItemRecord {
    pub scope: DedupScope,
    pub item_id: String,
    pub item_type: String,
    pub processed_at: DateTime<Utc>,
}
