//! Pool statistics

use crate::platform::Platform;
use crate::state::AccountStatus;
use crate::storage::AccountRecord;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Circuit breaker state of one platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerState {
    pub platform: Platform,
    /// Failures inside the trailing window
    pub recent_failures: usize,
    pub panicked: bool,
    /// When the oldest failure ages out
    pub reopens_at: Option<DateTime<Utc>>,
}

/// Account pool summary
#[derive(Debug, Clone)]
pub struct PoolStatistics {
    /// Total number of accounts considered
    pub total_accounts: usize,

    /// Count of accounts by status
    pub accounts_by_status: HashMap<AccountStatus, usize>,

    /// Mean health score, 0 when there are no accounts
    pub average_health: f64,

    pub total_uses: u64,
    pub total_successes: u64,
    pub total_failures: u64,

    /// Accounts whose cooldown has not elapsed
    pub cooling_down: usize,

    /// Breaker state per platform
    pub breakers: Vec<BreakerState>,
}

impl PoolStatistics {
    /// Summarizes a set of accounts at `now`
    pub fn from_accounts(
        accounts: &[AccountRecord],
        breakers: Vec<BreakerState>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut health_sum: u64 = 0;
        let mut stats = Self {
            total_accounts: accounts.len(),
            accounts_by_status: HashMap::new(),
            average_health: 0.0,
            total_uses: 0,
            total_successes: 0,
            total_failures: 0,
            cooling_down: 0,
            breakers,
        };

        for account in accounts {
            *stats.accounts_by_status.entry(account.status).or_insert(0) += 1;
            health_sum += account.health_score as u64;
            stats.total_uses += account.use_count;
            stats.total_successes += account.success_count;
            stats.total_failures += account.fail_count;
            if account.is_cooling_down_at(now) {
                stats.cooling_down += 1;
            }
        }

        if !accounts.is_empty() {
            stats.average_health = health_sum as f64 / accounts.len() as f64;
        }
        stats
    }

    pub fn count(&self, status: AccountStatus) -> usize {
        self.accounts_by_status.get(&status).copied().unwrap_or(0)
    }
}
