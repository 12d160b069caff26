//! Background cache reconciliation

use crate::config::SyncConfig;
use crate::pool::AccountPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

/// Periodically re-syncs the account cache from storage
///
/// Normal ticks pull only rows changed since the last sync; every
/// `full-reload-every` ticks reloads everything. Dropping the handle
/// leaves the task running; call [`shutdown`](Self::shutdown) to stop it.
pub struct Reconciler {
    handle: JoinHandle<()>,
}

impl Reconciler {
    pub fn spawn(pool: Arc<AccountPool>, config: &SyncConfig) -> Self {
        let period = Duration::from_secs(config.interval_secs.max(1));
        let full_every = config.full_reload_every.max(1) as u64;

        let handle = tokio::spawn(async move {
            tracing::info!(
                "[Reconciler] Started: every {}s, full reload every {} ticks",
                period.as_secs(),
                full_every
            );
            let mut interval = time::interval(period);
            // The first tick completes immediately; the pool was just loaded
            interval.tick().await;

            let mut tick: u64 = 0;
            loop {
                interval.tick().await;
                tick += 1;
                reconcile_once(&pool, tick % full_every == 0);
            }
        });

        Self { handle }
    }

    /// Stops the background task
    pub fn shutdown(self) {
        self.handle.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// Runs one reconciliation pass; failures are logged and retried next tick
pub fn reconcile_once(pool: &AccountPool, full: bool) {
    let registry = pool.registry();
    let result = if full {
        registry.full_reload()
    } else {
        registry.sync_incremental()
    };

    match result {
        Ok(0) => {}
        Ok(count) => tracing::debug!(
            "[Reconciler] {} sync refreshed {} accounts",
            if full { "Full" } else { "Incremental" },
            count
        ),
        Err(e) => tracing::error!("[Reconciler] Sync failed: {}", e),
    }
}
