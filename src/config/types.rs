use crate::state::{cooldown_from_secs, TransitionPolicy};
use serde::Deserialize;

/// Main configuration structure for Crawl-Warden
///
/// Every section and field has a default, so an empty file is a valid
/// configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default, rename = "circuit-breaker")]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Account selection and usage policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PoolConfig {
    /// Accounts below this health score are never selected
    pub min_health: u8,

    /// Maximum uses per account per calendar day
    pub max_daily_requests: u32,

    /// Cooldown after every use when the caller gives none (seconds)
    pub base_cooldown_secs: u64,

    /// Cap on the exponential backoff multiplier
    pub max_backoff_multiplier: u32,

    /// How far ahead `acquire_account_with_wait` looks for a cooldown to end (seconds)
    pub wait_horizon_secs: u64,

    /// Concurrent probes during a batch health check
    pub health_check_concurrency: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_health: 30,
            max_daily_requests: 500,
            base_cooldown_secs: 300,
            max_backoff_multiplier: 32,
            wait_horizon_secs: 20,
            health_check_concurrency: 4,
        }
    }
}

impl PoolConfig {
    /// Builds the policy used by the account transition function
    pub fn transition_policy(&self) -> TransitionPolicy {
        TransitionPolicy {
            min_health: self.min_health,
            base_cooldown: cooldown_from_secs(self.base_cooldown_secs),
            max_backoff_multiplier: self.max_backoff_multiplier,
        }
    }
}

/// Platform-wide circuit breaker
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CircuitBreakerConfig {
    /// Length of the trailing failure window (seconds)
    pub window_secs: u64,

    /// Failures inside the window that open the breaker
    pub threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_secs: 600,
            threshold: 5,
        }
    }
}

/// Proxy binding and validation
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProxyConfig {
    /// A binding expiring within this many seconds is treated as expired
    pub expiry_buffer_secs: u64,

    /// Failures after which an ip:port is blacklisted
    pub max_ip_failures: u32,

    /// Candidates drawn per bind before giving up
    pub acquire_retries: u32,

    /// Whether candidates are checked against `echo-url` before binding
    pub validate: bool,

    /// Known-good endpoint used for validation pings
    pub echo_url: String,

    /// Timeout of a validation ping (seconds)
    pub validate_timeout_secs: u64,

    /// Lifetime of snapshots issued from the static endpoint list (seconds)
    pub lease_secs: u64,

    /// Static proxy endpoints
    pub endpoints: Vec<ProxyEndpoint>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            expiry_buffer_secs: 60,
            max_ip_failures: 3,
            acquire_retries: 3,
            validate: true,
            echo_url: "https://httpbin.org/ip".to_string(),
            validate_timeout_secs: 10,
            lease_secs: 1800,
            endpoints: Vec::new(),
        }
    }
}

/// A statically configured proxy endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyEndpoint {
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Durable store location
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./crawl-warden.db".to_string(),
        }
    }
}

/// Cache reconciliation
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SyncConfig {
    /// Seconds between reconciliation passes
    pub interval_secs: u64,

    /// Every Nth pass reloads all accounts instead of the changed ones
    pub full_reload_every: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 15,
            full_reload_every: 20,
        }
    }
}
