//! Account filtering and ranking
//!
//! Selection is pure: it reads account records and never mutates them.

use crate::config::PoolConfig;
use crate::platform::Platform;
use crate::state::AccountStatus;
use crate::storage::AccountRecord;
use chrono::{DateTime, Duration, Utc};
use std::cmp::Reverse;

/// What the caller is asking for
#[derive(Debug, Clone, Copy)]
pub struct AccountQuery<'a> {
    pub platform: Platform,
    pub exclude_ids: &'a [i64],
    pub project_id: Option<&'a str>,
    pub user_id: Option<&'a str>,
}

impl<'a> AccountQuery<'a> {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            exclude_ids: &[],
            project_id: None,
            user_id: None,
        }
    }

    pub fn excluding(mut self, ids: &'a [i64]) -> Self {
        self.exclude_ids = ids;
        self
    }

    pub fn for_project(mut self, project_id: &'a str) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn for_user(mut self, user_id: &'a str) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// Thresholds an account must meet to be handed out
#[derive(Debug, Clone, Copy)]
pub struct SelectionPolicy {
    pub min_health: u8,
    pub max_daily_requests: u32,
}

impl From<&PoolConfig> for SelectionPolicy {
    fn from(config: &PoolConfig) -> Self {
        Self {
            min_health: config.min_health,
            max_daily_requests: config.max_daily_requests,
        }
    }
}

/// Checks every filter except the cooldown
fn matches_ignoring_cooldown(
    account: &AccountRecord,
    query: &AccountQuery<'_>,
    policy: &SelectionPolicy,
    now: DateTime<Utc>,
) -> bool {
    if account.platform != query.platform {
        return false;
    }
    if let Some(user_id) = query.user_id {
        if account.owning_user_id.as_deref() != Some(user_id) {
            return false;
        }
    }
    if query.exclude_ids.contains(&account.id) {
        return false;
    }
    if account.status != AccountStatus::Active {
        return false;
    }
    if account.health_score < policy.min_health {
        return false;
    }
    account.daily_usage_at(now) < policy.max_daily_requests
}

/// Returns true if the account may be handed out at `now`
pub fn is_eligible(
    account: &AccountRecord,
    query: &AccountQuery<'_>,
    policy: &SelectionPolicy,
    now: DateTime<Utc>,
) -> bool {
    matches_ignoring_cooldown(account, query, policy, now) && !account.is_cooling_down_at(now)
}

type Rank = (bool, u8, Reverse<Option<DateTime<Utc>>>);

fn rank(account: &AccountRecord, query: &AccountQuery<'_>) -> Rank {
    let sticky = match (query.project_id, account.last_project_id.as_deref()) {
        (Some(wanted), Some(last)) => wanted == last,
        _ => false,
    };
    (sticky, account.health_score, Reverse(account.last_used))
}

/// Picks the best eligible account
///
/// Ranking: sticky project match first, then higher health, then least
/// recently used (never-used first). Ties keep input order, so callers
/// pass accounts in ascending id order.
pub fn select_account<'r, I>(
    accounts: I,
    query: &AccountQuery<'_>,
    policy: &SelectionPolicy,
    now: DateTime<Utc>,
) -> Option<&'r AccountRecord>
where
    I: IntoIterator<Item = &'r AccountRecord>,
{
    let mut best: Option<(&AccountRecord, Rank)> = None;

    for account in accounts {
        if !is_eligible(account, query, policy, now) {
            continue;
        }
        let candidate_rank = rank(account, query);
        let better = match &best {
            Some((_, best_rank)) => candidate_rank > *best_rank,
            None => true,
        };
        if better {
            best = Some((account, candidate_rank));
        }
    }

    best.map(|(account, _)| account)
}

/// Earliest instant within `horizon` at which a cooling account becomes eligible
pub fn next_cooldown_expiry<'r, I>(
    accounts: I,
    query: &AccountQuery<'_>,
    policy: &SelectionPolicy,
    now: DateTime<Utc>,
    horizon: Duration,
) -> Option<DateTime<Utc>>
where
    I: IntoIterator<Item = &'r AccountRecord>,
{
    accounts
        .into_iter()
        .filter(|account| matches_ignoring_cooldown(account, query, policy, now))
        .filter_map(|account| account.cooldown_until)
        .filter(|until| *until > now && *until <= now + horizon)
        .min()
}
