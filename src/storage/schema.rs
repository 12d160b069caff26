//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Crawl-Warden database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Crawl accounts and their health/usage counters
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    platform TEXT NOT NULL,
    name TEXT NOT NULL,
    credential TEXT NOT NULL,
    status TEXT NOT NULL,
    status_reason TEXT,
    health_score INTEGER NOT NULL DEFAULT 100,
    use_count INTEGER NOT NULL DEFAULT 0,
    daily_use_count INTEGER NOT NULL DEFAULT 0,
    success_count INTEGER NOT NULL DEFAULT 0,
    fail_count INTEGER NOT NULL DEFAULT 0,
    consecutive_fails INTEGER NOT NULL DEFAULT 0,
    last_used TEXT,
    last_check TEXT,
    cooldown_until TEXT,
    account_group TEXT,
    tags TEXT NOT NULL DEFAULT '',
    bound_proxy_id TEXT,
    last_project_id TEXT,
    owning_user_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_accounts_platform ON accounts(platform);
CREATE INDEX IF NOT EXISTS idx_accounts_updated ON accounts(updated_at);

-- Account to proxy affinity
CREATE TABLE IF NOT EXISTS proxy_bindings (
    account_id INTEGER PRIMARY KEY,
    ip TEXT NOT NULL,
    port INTEGER NOT NULL,
    user TEXT,
    password TEXT,
    expires_at TEXT NOT NULL,
    bound_at TEXT NOT NULL
);

-- Crawl progress per (platform, crawler type, project, key)
CREATE TABLE IF NOT EXISTS checkpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    platform TEXT NOT NULL,
    crawler_type TEXT NOT NULL,
    project_id TEXT,
    task_key TEXT NOT NULL,
    current_page INTEGER NOT NULL DEFAULT 0,
    cursor TEXT,
    total_fetched INTEGER NOT NULL DEFAULT 0,
    total_comments INTEGER NOT NULL DEFAULT 0,
    total_errors INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_key
    ON checkpoints(platform, crawler_type, task_key, status);

-- Append-only dedup set
CREATE TABLE IF NOT EXISTS processed_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scope TEXT NOT NULL,
    item_id TEXT NOT NULL,
    item_type TEXT NOT NULL,
    processed_at TEXT NOT NULL,
    UNIQUE(scope, item_id)
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
