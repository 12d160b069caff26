//! Crawl-Warden: crawl resource & reliability layer
//!
//! This crate keeps a multi-platform crawler supplied with usable credentials
//! ("accounts") and egress proxies, and lets it resume interrupted crawls
//! without re-ingesting items. It is an embedded library: callers construct
//! the services explicitly and share them between crawl tasks.
//!
//! # Components
//!
//! - [`pool::AccountPool`]: account selection, usage recording, health probes,
//!   exponential cooldowns and the per-platform circuit breaker
//! - [`proxy::ProxyAffinityBinder`]: account → proxy affinity with expiry and
//!   ip:port blacklisting
//! - [`checkpoint::CheckpointStore`]: crawl progress and the dedup set of
//!   processed items
//! - [`storage::SqliteStorage`]: the durable mirror of all of the above

pub mod checkpoint;
pub mod config;
pub mod logging;
pub mod platform;
pub mod pool;
pub mod proxy;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Crawl-Warden operations
#[derive(Debug, Error)]
pub enum WardenError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] proxy::ProxyError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Account not found: {0}")]
    AccountNotFound(i64),

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(i64),

    #[error("Invalid checkpoint transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::CheckpointStatus,
        to: state::CheckpointStatus,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Platform tag errors
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Unknown platform: {0:?}")]
    UnknownPlatform(String),
}

/// Result type alias for Crawl-Warden operations
pub type Result<T> = std::result::Result<T, WardenError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use checkpoint::CheckpointStore;
pub use config::Config;
pub use platform::Platform;
pub use pool::AccountPool;
pub use proxy::{ProxyAffinityBinder, ProxySnapshot};
pub use state::{AccountStatus, CheckpointStatus};
