//! Account pool module
//!
//! This module hands out crawl accounts and tracks how they behave:
//! - Selection of one usable account per request
//! - Usage recording with health scores and exponential cooldowns
//! - Credential health probes
//! - The per-platform circuit breaker
//! - Background reconciliation of the account cache

mod backoff;
mod health;
mod reconciler;
mod registry;
mod selector;
mod stats;

pub use backoff::FailureBackoffController;
pub use health::{CredentialCheck, CredentialVerdict, HealthVerifier, NoopVerifier};
pub use reconciler::{reconcile_once, Reconciler};
pub use registry::AccountRegistry;
pub use selector::{is_eligible, next_cooldown_expiry, select_account, AccountQuery, SelectionPolicy};
pub use stats::{BreakerState, PoolStatistics};

use crate::config::Config;
use crate::platform::Platform;
use crate::state::{cooldown_from_secs, AccountStatus, Transition};
use crate::storage::{AccountRecord, NewAccount, SharedStorage};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;

/// Outcome of one credential probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckOutcome {
    pub account_id: i64,
    pub check: CredentialCheck,
    pub previous_status: AccountStatus,
    pub status: AccountStatus,
}

/// The account service shared by every crawl task
///
/// Construct one per process and share it behind an `Arc`.
pub struct AccountPool {
    registry: AccountRegistry,
    backoff: FailureBackoffController,
    verifier: Arc<dyn HealthVerifier>,
    selection: SelectionPolicy,
    wait_horizon: Duration,
    health_check_concurrency: usize,
}

impl AccountPool {
    /// Creates a pool and loads all accounts from storage
    pub fn new(
        storage: SharedStorage,
        config: &Config,
        verifier: Arc<dyn HealthVerifier>,
    ) -> Result<Self> {
        let registry = AccountRegistry::load(storage, config.pool.transition_policy())?;
        tracing::info!("[AccountPool] Loaded {} accounts", registry.len());

        Ok(Self {
            registry,
            backoff: FailureBackoffController::from_config(&config.circuit_breaker, &config.pool),
            verifier,
            selection: SelectionPolicy::from(&config.pool),
            wait_horizon: Duration::seconds(config.pool.wait_horizon_secs as i64),
            health_check_concurrency: config.pool.health_check_concurrency.max(1),
        })
    }

    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    pub fn backoff(&self) -> &FailureBackoffController {
        &self.backoff
    }

    // ===== Selection =====

    /// Returns the best usable account, or `None` if there is none
    ///
    /// Returns `None` without scanning while the platform's circuit breaker
    /// is open. Selection is read-only; report the outcome with
    /// [`mark_account_used`](Self::mark_account_used).
    pub fn get_available_account(
        &self,
        platform: Platform,
        exclude_ids: &[i64],
        project_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Option<AccountRecord> {
        let query = AccountQuery {
            platform,
            exclude_ids,
            project_id,
            user_id,
        };
        self.select_at(&query, Utc::now())
    }

    /// Selection against an explicit clock
    pub fn select_at(&self, query: &AccountQuery<'_>, now: DateTime<Utc>) -> Option<AccountRecord> {
        if self.backoff.is_platform_panicked_at(query.platform, now) {
            tracing::warn!(
                "[AccountPool] Circuit open for {}, refusing to hand out accounts",
                query.platform
            );
            return None;
        }

        let accounts = self.registry.list(Some(query.platform));
        let selected = select_account(&accounts, query, &self.selection, now).cloned();
        match &selected {
            Some(account) => tracing::debug!(
                "[AccountPool] Selected account {} ({}) for {}",
                account.id,
                account.credential_fingerprint(),
                query.platform
            ),
            None => tracing::debug!("[AccountPool] No available account for {}", query.platform),
        }
        selected
    }

    /// Like [`get_available_account`](Self::get_available_account), but waits
    /// once for a cooldown that ends within the wait horizon
    pub async fn acquire_account_with_wait(
        &self,
        platform: Platform,
        exclude_ids: &[i64],
        project_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Option<AccountRecord> {
        if let Some(account) = self.get_available_account(platform, exclude_ids, project_id, user_id)
        {
            return Some(account);
        }
        if self.backoff.is_platform_panicked(platform) {
            return None;
        }

        let query = AccountQuery {
            platform,
            exclude_ids,
            project_id,
            user_id,
        };
        let now = Utc::now();
        let accounts = self.registry.list(Some(platform));
        let ready_at =
            next_cooldown_expiry(&accounts, &query, &self.selection, now, self.wait_horizon)?;

        let wait = (ready_at - now).to_std().unwrap_or_default();
        tracing::info!(
            "[AccountPool] Waiting {}ms for a {} account to leave cooldown",
            wait.as_millis(),
            platform
        );
        tokio::time::sleep(wait + std::time::Duration::from_millis(10)).await;

        self.get_available_account(platform, exclude_ids, project_id, user_id)
    }

    // ===== Usage =====

    /// Records the outcome of a request made with an account
    ///
    /// A failure also counts against the platform's circuit breaker.
    pub async fn mark_account_used(
        &self,
        account_id: i64,
        success: bool,
        cooldown_seconds: Option<u64>,
        project_id: Option<&str>,
    ) -> Result<AccountRecord> {
        self.mark_account_used_at(account_id, success, cooldown_seconds, project_id, Utc::now())
            .await
    }

    /// Alias of [`mark_account_used`](Self::mark_account_used)
    pub async fn record_account_usage(
        &self,
        account_id: i64,
        success: bool,
        cooldown_seconds: Option<u64>,
        project_id: Option<&str>,
    ) -> Result<AccountRecord> {
        self.mark_account_used(account_id, success, cooldown_seconds, project_id)
            .await
    }

    pub async fn mark_account_used_at(
        &self,
        account_id: i64,
        success: bool,
        cooldown_seconds: Option<u64>,
        project_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AccountRecord> {
        let transition = Transition::Used {
            success,
            cooldown: cooldown_seconds.map(cooldown_from_secs),
            project_id: project_id.map(str::to_string),
        };
        let (record, outcome) = self.registry.apply(account_id, &transition, now).await?;

        if !success {
            self.backoff.record_platform_failure_at(record.platform, now);
            tracing::info!(
                "[AccountPool] Account {} failed ({} in a row), cooling down for {}s",
                account_id,
                record.consecutive_fails,
                outcome.cooldown.map(|c| c.num_seconds()).unwrap_or(0)
            );
        }
        if outcome.status_changed() {
            tracing::info!(
                "[AccountPool] Account {} status {} -> {}",
                account_id,
                outcome.previous_status,
                outcome.status
            );
        }
        Ok(record)
    }

    // ===== Health =====

    /// Probes an account's credential and folds the verdict into its status
    ///
    /// The more severe of the current and probed status wins.
    pub async fn check_account_health(&self, account_id: i64) -> Result<HealthCheckOutcome> {
        let account = self
            .registry
            .get(account_id)
            .ok_or(crate::WardenError::AccountNotFound(account_id))?;

        let check = self.verifier.verify(&account).await;
        let transition = Transition::Probed {
            status: check.verdict.implied_status(),
            reason: check.reason.clone(),
        };
        let (_, outcome) = self.registry.apply(account_id, &transition, Utc::now()).await?;

        if outcome.status_changed() {
            tracing::info!(
                "[AccountPool] Probe moved account {} from {} to {}: {}",
                account_id,
                outcome.previous_status,
                outcome.status,
                check.reason
            );
        }
        Ok(HealthCheckOutcome {
            account_id,
            check,
            previous_status: outcome.previous_status,
            status: outcome.status,
        })
    }

    /// Probes every account, optionally of one platform, with bounded concurrency
    pub async fn batch_check_health(&self, platform: Option<Platform>) -> Vec<HealthCheckOutcome> {
        let ids: Vec<i64> = self
            .registry
            .list(platform)
            .into_iter()
            .map(|account| account.id)
            .collect();
        tracing::info!(
            "[AccountPool] Checking {} accounts (max {} concurrent)",
            ids.len(),
            self.health_check_concurrency
        );

        stream::iter(ids)
            .map(|id| self.check_account_health(id))
            .buffer_unordered(self.health_check_concurrency)
            .filter_map(|result| async move {
                match result {
                    Ok(outcome) => Some(outcome),
                    Err(e) => {
                        tracing::warn!("[AccountPool] Health check failed: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await
    }

    // ===== Operator actions =====

    /// Imports a new account; it starts active with full health
    pub fn add_account(&self, account: NewAccount) -> Result<AccountRecord> {
        let record = self.registry.insert(&account)?;
        tracing::info!(
            "[AccountPool] Added {} account {} ({})",
            record.platform,
            record.id,
            record.credential_fingerprint()
        );
        Ok(record)
    }

    /// Sets an account's status explicitly, e.g. to unban it
    pub async fn set_account_status(
        &self,
        account_id: i64,
        status: AccountStatus,
        reason: &str,
    ) -> Result<AccountRecord> {
        let transition = Transition::Override {
            status,
            reason: reason.to_string(),
        };
        let (record, outcome) = self.registry.apply(account_id, &transition, Utc::now()).await?;
        tracing::info!(
            "[AccountPool] Operator set account {} {} -> {}: {}",
            account_id,
            outcome.previous_status,
            outcome.status,
            reason
        );
        Ok(record)
    }

    /// Records the proxy endpoint an account is bound to
    pub async fn set_bound_proxy(
        &self,
        account_id: i64,
        endpoint: Option<String>,
    ) -> Result<AccountRecord> {
        self.registry.set_bound_proxy(account_id, endpoint).await
    }

    // ===== Views =====

    pub fn get_account(&self, account_id: i64) -> Option<AccountRecord> {
        self.registry.get(account_id)
    }

    pub fn list_accounts(&self, platform: Option<Platform>) -> Vec<AccountRecord> {
        self.registry.list(platform)
    }

    pub fn is_platform_panicked(&self, platform: Platform) -> bool {
        self.backoff.is_platform_panicked(platform)
    }

    /// Summarizes the pool, optionally for one platform
    pub fn get_statistics(&self, platform: Option<Platform>) -> PoolStatistics {
        let now = Utc::now();
        let accounts = self.registry.list(platform);
        let platforms: Vec<Platform> = match platform {
            Some(platform) => vec![platform],
            None => Platform::all().to_vec(),
        };
        let breakers = platforms
            .into_iter()
            .map(|platform| BreakerState {
                platform,
                recent_failures: self.backoff.failures_in_window_at(platform, now),
                panicked: self.backoff.is_platform_panicked_at(platform, now),
                reopens_at: self.backoff.reopens_at_from(platform, now),
            })
            .collect();

        PoolStatistics::from_accounts(&accounts, breakers, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{shared, SqliteStorage};
    use async_trait::async_trait;

    /// Returns the same verdict for every account
    struct FixedVerifier(CredentialVerdict);

    #[async_trait]
    impl HealthVerifier for FixedVerifier {
        async fn verify(&self, _account: &AccountRecord) -> CredentialCheck {
            CredentialCheck::new(self.0, "fixed")
        }
    }

    fn pool_with(verdict: CredentialVerdict) -> AccountPool {
        let storage = shared(SqliteStorage::new_in_memory().unwrap());
        AccountPool::new(storage, &Config::default(), Arc::new(FixedVerifier(verdict))).unwrap()
    }

    #[tokio::test]
    async fn test_used_account_cools_down() {
        let pool = pool_with(CredentialVerdict::Valid);
        let account = pool
            .add_account(NewAccount::new(Platform::Xhs, "a", "cookie"))
            .unwrap();

        let selected = pool.get_available_account(Platform::Xhs, &[], None, None);
        assert_eq!(selected.map(|a| a.id), Some(account.id));

        pool.mark_account_used(account.id, true, None, None).await.unwrap();
        assert!(pool
            .get_available_account(Platform::Xhs, &[], None, None)
            .is_none());
    }

    #[tokio::test]
    async fn test_failures_open_breaker() {
        let pool = pool_with(CredentialVerdict::Valid);
        let mut ids = Vec::new();
        for i in 0..6 {
            let account = pool
                .add_account(NewAccount::new(Platform::Douyin, format!("a{}", i), format!("c{}", i)))
                .unwrap();
            ids.push(account.id);
        }

        for id in &ids[..5] {
            pool.mark_account_used(*id, false, Some(1), None).await.unwrap();
        }

        assert!(pool.is_platform_panicked(Platform::Douyin));
        assert!(pool
            .get_available_account(Platform::Douyin, &[], None, None)
            .is_none());
        assert!(!pool.is_platform_panicked(Platform::Xhs));

        let stats = pool.get_statistics(Some(Platform::Douyin));
        assert_eq!(stats.breakers.len(), 1);
        assert!(stats.breakers[0].panicked);
        assert_eq!(stats.breakers[0].recent_failures, 5);
        assert_eq!(stats.total_failures, 5);
    }

    #[tokio::test]
    async fn test_banned_stays_banned_until_override() {
        let pool = pool_with(CredentialVerdict::Valid);
        let account = pool
            .add_account(NewAccount::new(Platform::Weibo, "a", "cookie"))
            .unwrap();

        pool.set_account_status(account.id, AccountStatus::Banned, "reported")
            .await
            .unwrap();
        let outcome = pool.check_account_health(account.id).await.unwrap();
        assert_eq!(outcome.status, AccountStatus::Banned);
        assert_eq!(outcome.check.verdict, CredentialVerdict::Valid);

        let record = pool
            .set_account_status(account.id, AccountStatus::Active, "appeal accepted")
            .await
            .unwrap();
        assert_eq!(record.status, AccountStatus::Active);
    }

    #[tokio::test]
    async fn test_probe_marks_expired() {
        let pool = pool_with(CredentialVerdict::Expired);
        let account = pool
            .add_account(NewAccount::new(Platform::Bilibili, "a", "cookie"))
            .unwrap();

        let outcome = pool.check_account_health(account.id).await.unwrap();
        assert_eq!(outcome.previous_status, AccountStatus::Active);
        assert_eq!(outcome.status, AccountStatus::Expired);

        let record = pool.get_account(account.id).unwrap();
        assert!(record.last_check.is_some());
        assert_eq!(record.status_reason.as_deref(), Some("fixed"));
    }

    #[tokio::test]
    async fn test_batch_check_health() {
        let pool = pool_with(CredentialVerdict::Banned);
        for i in 0..5 {
            pool.add_account(NewAccount::new(Platform::Kuaishou, format!("k{}", i), "c"))
                .unwrap();
        }
        pool.add_account(NewAccount::new(Platform::Tieba, "t", "c"))
            .unwrap();

        let outcomes = pool.batch_check_health(Some(Platform::Kuaishou)).await;
        assert_eq!(outcomes.len(), 5);
        assert!(outcomes.iter().all(|o| o.status == AccountStatus::Banned));

        let stats = pool.get_statistics(None);
        assert_eq!(stats.count(AccountStatus::Banned), 5);
        assert_eq!(stats.count(AccountStatus::Active), 1);
        assert_eq!(stats.breakers.len(), Platform::all().len());
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let pool = pool_with(CredentialVerdict::Valid);
        assert!(pool.mark_account_used(42, true, None, None).await.is_err());
        assert!(pool.check_account_health(42).await.is_err());
    }

    #[tokio::test]
    async fn test_wait_for_cooldown() {
        let pool = pool_with(CredentialVerdict::Valid);
        let account = pool
            .add_account(NewAccount::new(Platform::Zhihu, "a", "cookie"))
            .unwrap();
        pool.mark_account_used(account.id, true, Some(1), None)
            .await
            .unwrap();

        assert!(pool
            .get_available_account(Platform::Zhihu, &[], None, None)
            .is_none());
        let waited = pool
            .acquire_account_with_wait(Platform::Zhihu, &[], None, None)
            .await;
        assert_eq!(waited.map(|a| a.id), Some(account.id));
    }
}
