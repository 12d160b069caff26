//! Account → proxy affinity

use crate::config::ProxyConfig;
use crate::pool::AccountPool;
use crate::proxy::{
    HttpProxyValidator, IpFailureTracker, ProxyBinding, ProxyError, ProxyProvider, ProxySnapshot,
    ProxyValidator, StaticProxyProvider,
};
use crate::storage::{lock_storage, SharedStorage, StorageResult};
use crate::ConfigError;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Pins each account to one proxy until the proxy expires or is blacklisted
///
/// Bindings are written through to storage so affinity survives restarts.
/// Storage failures are logged; the in-memory binding stays authoritative.
/// With an attached [`AccountPool`], each account's `bound_proxy_id`
/// follows its binding.
pub struct ProxyAffinityBinder {
    bindings: DashMap<i64, ProxyBinding>,
    accounts: Option<Arc<AccountPool>>,
    bind_locks: DashMap<i64, Arc<Mutex<()>>>,
    tracker: IpFailureTracker,
    provider: Arc<dyn ProxyProvider>,
    validator: Option<Arc<dyn ProxyValidator>>,
    storage: SharedStorage,
    expiry_buffer: Duration,
    acquire_retries: u32,
}

impl ProxyAffinityBinder {
    /// Creates a binder with explicit collaborators
    ///
    /// Pass `None` as the validator to bind candidates without a ping.
    pub fn new(
        config: &ProxyConfig,
        provider: Arc<dyn ProxyProvider>,
        validator: Option<Arc<dyn ProxyValidator>>,
        storage: SharedStorage,
    ) -> Self {
        Self {
            bindings: DashMap::new(),
            accounts: None,
            bind_locks: DashMap::new(),
            tracker: IpFailureTracker::new(config.max_ip_failures),
            provider,
            validator,
            storage,
            expiry_buffer: Duration::seconds(config.expiry_buffer_secs as i64),
            acquire_retries: config.acquire_retries.max(1),
        }
    }

    /// Mirrors binds and releases into the pool's account records
    pub fn with_account_pool(mut self, pool: Arc<AccountPool>) -> Self {
        self.accounts = Some(pool);
        self
    }

    async fn record_bound_proxy(&self, account_id: i64, endpoint: Option<String>) {
        if let Some(pool) = &self.accounts {
            if let Err(e) = pool.set_bound_proxy(account_id, endpoint).await {
                tracing::warn!(
                    "[ProxyBinder] Could not update bound proxy of account {}: {}",
                    account_id,
                    e
                );
            }
        }
    }

    /// Creates a binder over the configured static endpoints and restores
    /// persisted bindings
    pub fn from_config(config: &ProxyConfig, storage: SharedStorage) -> Result<Self, ConfigError> {
        let provider: Arc<dyn ProxyProvider> = Arc::new(StaticProxyProvider::from_config(config));
        let validator: Option<Arc<dyn ProxyValidator>> = if config.validate {
            Some(Arc::new(HttpProxyValidator::from_config(config)?))
        } else {
            None
        };

        let binder = Self::new(config, provider, validator, storage);
        if let Err(e) = binder.restore() {
            tracing::error!("[ProxyBinder] Failed to restore bindings: {}", e);
        }
        Ok(binder)
    }

    /// Loads persisted bindings, skipping the ones that have expired
    ///
    /// # Returns
    ///
    /// The number of bindings restored
    pub fn restore(&self) -> StorageResult<usize> {
        let stored = lock_storage(&self.storage).load_proxy_bindings()?;
        let now = Utc::now();
        let mut restored = 0;

        for binding in stored {
            if binding.proxy.is_expired_at(now, self.expiry_buffer) {
                tracing::debug!(
                    "[ProxyBinder] Skipping expired binding for account {} ({})",
                    binding.account_id,
                    binding.proxy.endpoint()
                );
                continue;
            }
            self.bindings.insert(binding.account_id, binding);
            restored += 1;
        }

        tracing::info!("[ProxyBinder] Restored {} proxy bindings", restored);
        Ok(restored)
    }

    /// Returns the account's proxy, binding a fresh one if needed
    ///
    /// A binding is reused while it is outside the expiry buffer and its
    /// endpoint is not blacklisted. Otherwise up to `acquire-retries`
    /// candidates are drawn; each failed validation counts against that
    /// endpoint.
    pub async fn get_or_bind(&self, account_id: i64) -> Result<ProxySnapshot, ProxyError> {
        let lock = self
            .bind_locks
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let now = Utc::now();
        if let Some(current) = self.usable_binding(account_id, now) {
            return Ok(current);
        }

        self.bind_fresh(account_id).await
    }

    /// Alias of [`get_or_bind`](Self::get_or_bind)
    pub async fn get_or_bind_proxy(&self, account_id: i64) -> Result<ProxySnapshot, ProxyError> {
        self.get_or_bind(account_id).await
    }

    /// Per-request expiry check, called before every outbound request
    ///
    /// Transparently re-binds when the current proxy has expired.
    pub async fn get_or_refresh_proxy(&self, account_id: i64) -> Result<ProxySnapshot, ProxyError> {
        self.get_or_bind(account_id).await
    }

    fn usable_binding(&self, account_id: i64, now: DateTime<Utc>) -> Option<ProxySnapshot> {
        let proxy = self.bindings.get(&account_id)?.proxy.clone();
        if proxy.is_expired_at(now, self.expiry_buffer) {
            tracing::debug!(
                "[ProxyBinder] Binding for account {} expired at {}",
                account_id,
                proxy.expires_at
            );
            return None;
        }
        if self.tracker.is_blacklisted(&proxy.endpoint()) {
            return None;
        }
        Some(proxy)
    }

    async fn bind_fresh(&self, account_id: i64) -> Result<ProxySnapshot, ProxyError> {
        for attempt in 1..=self.acquire_retries {
            let exclude = self.tracker.blacklisted();
            let candidate = match self.provider.next_candidate(&exclude).await? {
                Some(candidate) => candidate,
                None => {
                    tracing::warn!(
                        "[ProxyBinder] Provider has no candidates left for account {}",
                        account_id
                    );
                    break;
                }
            };

            if candidate.is_expired_at(Utc::now(), self.expiry_buffer) {
                tracing::warn!(
                    "[ProxyBinder] Provider issued an already-expiring proxy {}",
                    candidate.endpoint()
                );
                continue;
            }

            if let Some(validator) = &self.validator {
                if let Err(e) = validator.validate(&candidate).await {
                    tracing::warn!(
                        "[ProxyBinder] Attempt {}/{} for account {}: {}",
                        attempt,
                        self.acquire_retries,
                        account_id,
                        e
                    );
                    self.mark_ip_failed(&candidate.ip, candidate.port).await;
                    continue;
                }
            }

            let binding = ProxyBinding {
                account_id,
                proxy: candidate.clone(),
                bound_at: Utc::now(),
            };
            if let Err(e) = lock_storage(&self.storage).save_proxy_binding(&binding) {
                tracing::error!(
                    "[ProxyBinder] Failed to persist binding for account {}: {}",
                    account_id,
                    e
                );
            }
            self.bindings.insert(account_id, binding);
            self.record_bound_proxy(account_id, Some(candidate.endpoint()))
                .await;

            tracing::info!(
                "[ProxyBinder] Bound account {} to {} (expires {})",
                account_id,
                candidate.endpoint(),
                candidate.expires_at
            );
            return Ok(candidate);
        }

        Err(ProxyError::Exhausted {
            account_id,
            attempts: self.acquire_retries,
        })
    }

    /// Records a failed request or validation through `ip:port`
    ///
    /// Once the endpoint reaches the failure limit it is blacklisted and
    /// every binding pointing at it is dropped.
    pub async fn mark_ip_failed(&self, ip: &str, port: u16) {
        let endpoint = format!("{}:{}", ip, port);
        if !self.tracker.record_failure(&endpoint) {
            tracing::debug!(
                "[ProxyBinder] {} failed ({} so far)",
                endpoint,
                self.tracker.failure_count(&endpoint)
            );
            return;
        }

        tracing::warn!("[ProxyBinder] Blacklisted {}", endpoint);

        let affected: Vec<i64> = self
            .bindings
            .iter()
            .filter(|entry| entry.proxy.endpoint() == endpoint)
            .map(|entry| *entry.key())
            .collect();
        for account_id in affected {
            self.release(account_id).await;
        }
    }

    /// Resets the failure counter of `ip:port`
    pub fn mark_ip_success(&self, ip: &str, port: u16) {
        self.tracker.record_success(&format!("{}:{}", ip, port));
    }

    /// Drops an account's binding so the next call binds afresh
    pub async fn release(&self, account_id: i64) {
        if self.bindings.remove(&account_id).is_none() {
            return;
        }
        self.record_bound_proxy(account_id, None).await;
        if let Err(e) = lock_storage(&self.storage).delete_proxy_binding(account_id) {
            tracing::error!(
                "[ProxyBinder] Failed to delete binding for account {}: {}",
                account_id,
                e
            );
        }
        tracing::debug!("[ProxyBinder] Released binding for account {}", account_id);
    }

    pub fn is_blacklisted(&self, ip: &str, port: u16) -> bool {
        self.tracker.is_blacklisted(&format!("{}:{}", ip, port))
    }

    /// Returns the current binding of an account, expired or not
    pub fn binding(&self, account_id: i64) -> Option<ProxyBinding> {
        self.bindings.get(&account_id).map(|entry| entry.clone())
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }
}
