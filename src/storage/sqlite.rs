//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::platform::Platform;
use crate::proxy::{ProxyBinding, ProxySnapshot};
use crate::state::{AccountStatus, CheckpointStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    AccountRecord, CheckpointKey, CheckpointRecord, CrawlerType, DedupScope, NewAccount,
    ProcessedItemRecord,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const ACCOUNT_COLUMNS: &str = "id, platform, name, credential, status, status_reason, \
     health_score, use_count, daily_use_count, success_count, fail_count, consecutive_fails, \
     last_used, last_check, cooldown_until, account_group, tags, bound_proxy_id, \
     last_project_id, owning_user_id, created_at, updated_at";

const CHECKPOINT_COLUMNS: &str = "id, platform, crawler_type, project_id, task_key, \
     current_page, cursor, total_fetched, total_comments, total_errors, status, \
     created_at, updated_at, error_message";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = init_database(path)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory database
    ///
    /// Used by tests and by hosts that only want the in-process behaviour.
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Formats a timestamp so that stored values sort lexicographically
fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("bad timestamp {:?}: {}", raw, e)))
}

fn optional_time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| conversion_error(idx, format!("bad timestamp {:?}: {}", raw, e))),
        None => Ok(None),
    }
}

fn platform_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Platform> {
    let raw: String = row.get(idx)?;
    Platform::normalize(&raw).map_err(|e| conversion_error(idx, e.to_string()))
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<AccountRecord> {
    let status_raw: String = row.get(4)?;
    let status = AccountStatus::from_db_string(&status_raw).unwrap_or(AccountStatus::Unknown);
    let tags: String = row.get(16)?;

    Ok(AccountRecord {
        id: row.get(0)?,
        platform: platform_column(row, 1)?,
        name: row.get(2)?,
        credential: row.get(3)?,
        status,
        status_reason: row.get(5)?,
        health_score: row.get::<_, i64>(6)?.clamp(0, 100) as u8,
        use_count: row.get::<_, i64>(7)? as u64,
        daily_use_count: row.get::<_, i64>(8)? as u32,
        success_count: row.get::<_, i64>(9)? as u64,
        fail_count: row.get::<_, i64>(10)? as u64,
        consecutive_fails: row.get::<_, i64>(11)? as u32,
        last_used: optional_time_column(row, 12)?,
        last_check: optional_time_column(row, 13)?,
        cooldown_until: optional_time_column(row, 14)?,
        group: row.get(15)?,
        tags: split_tags(&tags),
        bound_proxy_id: row.get(17)?,
        last_project_id: row.get(18)?,
        owning_user_id: row.get(19)?,
        created_at: time_column(row, 20)?,
        updated_at: time_column(row, 21)?,
    })
}

fn checkpoint_from_row(row: &Row<'_>) -> rusqlite::Result<CheckpointRecord> {
    let crawler_raw: String = row.get(2)?;
    let crawler_type = CrawlerType::from_db_string(&crawler_raw)
        .ok_or_else(|| conversion_error(2, format!("unknown crawler type {:?}", crawler_raw)))?;
    let status_raw: String = row.get(10)?;
    let status = CheckpointStatus::from_db_string(&status_raw)
        .ok_or_else(|| conversion_error(10, format!("unknown status {:?}", status_raw)))?;

    Ok(CheckpointRecord {
        id: row.get(0)?,
        platform: platform_column(row, 1)?,
        crawler_type,
        project_id: row.get(3)?,
        key: row.get(4)?,
        current_page: row.get::<_, i64>(5)? as u32,
        cursor: row.get(6)?,
        total_fetched: row.get::<_, i64>(7)? as u64,
        total_comments: row.get::<_, i64>(8)? as u64,
        total_errors: row.get::<_, i64>(9)? as u64,
        status,
        created_at: time_column(row, 11)?,
        updated_at: time_column(row, 12)?,
        error_message: row.get(13)?,
    })
}

fn binding_from_row(row: &Row<'_>) -> rusqlite::Result<ProxyBinding> {
    Ok(ProxyBinding {
        account_id: row.get(0)?,
        proxy: ProxySnapshot {
            ip: row.get(1)?,
            port: row.get::<_, i64>(2)? as u16,
            user: row.get(3)?,
            password: row.get(4)?,
            expires_at: time_column(row, 5)?,
        },
        bound_at: time_column(row, 6)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Accounts =====

    fn insert_account(&mut self, account: &NewAccount) -> StorageResult<AccountRecord> {
        let now = format_time(Utc::now());
        self.conn.execute(
            "INSERT INTO accounts (platform, name, credential, status, account_group, tags,
             owning_user_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                account.platform.as_str(),
                account.name,
                account.credential,
                AccountStatus::Active.to_db_string(),
                account.group,
                account.tags.join(","),
                account.owning_user_id,
                now
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        self.get_account(id)?
            .ok_or(StorageError::AccountNotFound(id))
    }

    fn get_account(&self, account_id: i64) -> StorageResult<Option<AccountRecord>> {
        let sql = format!("SELECT {} FROM accounts WHERE id = ?1", ACCOUNT_COLUMNS);
        let account = self
            .conn
            .query_row(&sql, params![account_id], account_from_row)
            .optional()?;
        Ok(account)
    }

    fn update_account(&mut self, account: &AccountRecord) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE accounts SET status = ?1, status_reason = ?2, health_score = ?3,
             use_count = ?4, daily_use_count = ?5, success_count = ?6, fail_count = ?7,
             consecutive_fails = ?8, last_used = ?9, last_check = ?10, cooldown_until = ?11,
             account_group = ?12, tags = ?13, bound_proxy_id = ?14, last_project_id = ?15,
             name = ?16, credential = ?17, updated_at = ?18
             WHERE id = ?19",
            params![
                account.status.to_db_string(),
                account.status_reason,
                account.health_score as i64,
                account.use_count as i64,
                account.daily_use_count as i64,
                account.success_count as i64,
                account.fail_count as i64,
                account.consecutive_fails as i64,
                account.last_used.map(format_time),
                account.last_check.map(format_time),
                account.cooldown_until.map(format_time),
                account.group,
                account.tags.join(","),
                account.bound_proxy_id,
                account.last_project_id,
                account.name,
                account.credential,
                format_time(account.updated_at),
                account.id
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::AccountNotFound(account.id));
        }
        Ok(())
    }

    fn load_accounts(&self) -> StorageResult<Vec<AccountRecord>> {
        let sql = format!("SELECT {} FROM accounts ORDER BY id", ACCOUNT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let accounts = stmt
            .query_map([], account_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    fn load_accounts_updated_since(
        &self,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<AccountRecord>> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE updated_at > ?1 ORDER BY id",
            ACCOUNT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let accounts = stmt
            .query_map(params![format_time(since)], account_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    // ===== Proxy Bindings =====

    fn save_proxy_binding(&mut self, binding: &ProxyBinding) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO proxy_bindings (account_id, ip, port, user, password, expires_at, bound_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(account_id) DO UPDATE SET ip = excluded.ip, port = excluded.port,
             user = excluded.user, password = excluded.password,
             expires_at = excluded.expires_at, bound_at = excluded.bound_at",
            params![
                binding.account_id,
                binding.proxy.ip,
                binding.proxy.port as i64,
                binding.proxy.user,
                binding.proxy.password,
                format_time(binding.proxy.expires_at),
                format_time(binding.bound_at)
            ],
        )?;
        Ok(())
    }

    fn load_proxy_bindings(&self) -> StorageResult<Vec<ProxyBinding>> {
        let mut stmt = self.conn.prepare(
            "SELECT account_id, ip, port, user, password, expires_at, bound_at
             FROM proxy_bindings ORDER BY account_id",
        )?;
        let bindings = stmt
            .query_map([], binding_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(bindings)
    }

    fn delete_proxy_binding(&mut self, account_id: i64) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM proxy_bindings WHERE account_id = ?1",
            params![account_id],
        )?;
        Ok(())
    }

    // ===== Checkpoints =====

    fn insert_checkpoint(&mut self, key: &CheckpointKey) -> StorageResult<CheckpointRecord> {
        let now = format_time(Utc::now());
        self.conn.execute(
            "INSERT INTO checkpoints (platform, crawler_type, project_id, task_key, status,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                key.platform.as_str(),
                key.crawler_type.to_db_string(),
                key.project_id,
                key.key,
                CheckpointStatus::Running.to_db_string(),
                now
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        self.get_checkpoint(id)?
            .ok_or(StorageError::CheckpointNotFound(id))
    }

    fn get_checkpoint(&self, checkpoint_id: i64) -> StorageResult<Option<CheckpointRecord>> {
        let sql = format!("SELECT {} FROM checkpoints WHERE id = ?1", CHECKPOINT_COLUMNS);
        let checkpoint = self
            .conn
            .query_row(&sql, params![checkpoint_id], checkpoint_from_row)
            .optional()?;
        Ok(checkpoint)
    }

    fn upsert_checkpoint(&mut self, checkpoint: &CheckpointRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO checkpoints (id, platform, crawler_type, project_id, task_key,
             current_page, cursor, total_fetched, total_comments, total_errors, status,
             created_at, updated_at, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(id) DO UPDATE SET current_page = excluded.current_page,
             cursor = excluded.cursor, total_fetched = excluded.total_fetched,
             total_comments = excluded.total_comments, total_errors = excluded.total_errors,
             status = excluded.status, updated_at = excluded.updated_at,
             error_message = excluded.error_message",
            params![
                checkpoint.id,
                checkpoint.platform.as_str(),
                checkpoint.crawler_type.to_db_string(),
                checkpoint.project_id,
                checkpoint.key,
                checkpoint.current_page as i64,
                checkpoint.cursor,
                checkpoint.total_fetched as i64,
                checkpoint.total_comments as i64,
                checkpoint.total_errors as i64,
                checkpoint.status.to_db_string(),
                format_time(checkpoint.created_at),
                format_time(checkpoint.updated_at),
                checkpoint.error_message
            ],
        )?;
        Ok(())
    }

    fn find_resumable_checkpoint(
        &self,
        key: &CheckpointKey,
    ) -> StorageResult<Option<CheckpointRecord>> {
        // `IS` compares NULL project ids as equal
        let sql = format!(
            "SELECT {} FROM checkpoints
             WHERE platform = ?1 AND crawler_type = ?2 AND project_id IS ?3 AND task_key = ?4
             AND status IN (?5, ?6)
             ORDER BY updated_at DESC, id DESC LIMIT 1",
            CHECKPOINT_COLUMNS
        );
        let checkpoint = self
            .conn
            .query_row(
                &sql,
                params![
                    key.platform.as_str(),
                    key.crawler_type.to_db_string(),
                    key.project_id,
                    key.key,
                    CheckpointStatus::Running.to_db_string(),
                    CheckpointStatus::Paused.to_db_string()
                ],
                checkpoint_from_row,
            )
            .optional()?;
        Ok(checkpoint)
    }

    // ===== Dedup Set =====

    fn insert_processed_item(&mut self, item: &ProcessedItemRecord) -> StorageResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO processed_items (scope, item_id, item_type, processed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                item.scope.to_db_string(),
                item.item_id,
                item.item_type,
                format_time(item.processed_at)
            ],
        )?;
        Ok(inserted > 0)
    }

    fn is_item_processed(&self, scope: &DedupScope, item_id: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM processed_items WHERE scope = ?1 AND item_id = ?2",
                params![scope.to_db_string(), item_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn count_processed_items(&self, scope: &DedupScope) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM processed_items WHERE scope = ?1",
            params![scope.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// Initializes or opens a database at the given path
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(Connection)` - Successfully opened/created database
/// * `Err(rusqlite::Error)` - Failed to open database
pub fn init_database(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;

    initialize_schema(&conn)?;

    Ok(conn)
}
