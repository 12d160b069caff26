//! Shared fixtures

use crawl_warden::config::Config;
use crawl_warden::pool::{CredentialCheck, CredentialVerdict, HealthVerifier, NoopVerifier};
use crawl_warden::storage::{shared, AccountRecord, SharedStorage, SqliteStorage};
use crawl_warden::AccountPool;
use std::sync::{Arc, Mutex};

pub fn memory_storage() -> SharedStorage {
    shared(SqliteStorage::new_in_memory().expect("in-memory database"))
}

pub fn pool(storage: SharedStorage) -> AccountPool {
    AccountPool::new(storage, &Config::default(), Arc::new(NoopVerifier)).expect("pool")
}

/// Verifier that records which accounts were probed
pub struct RecordingVerifier {
    pub verdict: CredentialVerdict,
    pub probed: Arc<Mutex<Vec<i64>>>,
}

impl RecordingVerifier {
    pub fn new(verdict: CredentialVerdict) -> Self {
        Self {
            verdict,
            probed: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait::async_trait]
impl HealthVerifier for RecordingVerifier {
    async fn verify(&self, account: &AccountRecord) -> CredentialCheck {
        self.probed.lock().unwrap().push(account.id);
        CredentialCheck::new(self.verdict, format!("probe of {}", account.name))
    }
}
