//! Proxy candidate sources

use crate::config::{ProxyConfig, ProxyEndpoint};
use crate::proxy::{ProxyError, ProxySnapshot};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A source of fresh proxy candidates
#[async_trait]
pub trait ProxyProvider: Send + Sync {
    /// Issues a new snapshot whose `ip:port` is not in `exclude`
    ///
    /// Returns `Ok(None)` when the source has nothing left to offer.
    async fn next_candidate(
        &self,
        exclude: &HashSet<String>,
    ) -> Result<Option<ProxySnapshot>, ProxyError>;
}

/// Issues snapshots from a fixed endpoint list, round-robin
///
/// Each issued snapshot is a lease that expires `lease` after issue.
#[derive(Debug)]
pub struct StaticProxyProvider {
    endpoints: Vec<ProxyEndpoint>,
    lease: Duration,
    cursor: AtomicUsize,
}

impl StaticProxyProvider {
    pub fn new(endpoints: Vec<ProxyEndpoint>, lease: Duration) -> Self {
        Self {
            endpoints,
            lease,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(
            config.endpoints.clone(),
            Duration::seconds(config.lease_secs as i64),
        )
    }

    fn issue(&self, endpoint: &ProxyEndpoint) -> ProxySnapshot {
        let snapshot = ProxySnapshot::new(endpoint.ip.clone(), endpoint.port, Utc::now() + self.lease);
        match (&endpoint.user, &endpoint.password) {
            (Some(user), Some(password)) => snapshot.with_auth(user.clone(), password.clone()),
            _ => snapshot,
        }
    }
}

#[async_trait]
impl ProxyProvider for StaticProxyProvider {
    async fn next_candidate(
        &self,
        exclude: &HashSet<String>,
    ) -> Result<Option<ProxySnapshot>, ProxyError> {
        let len = self.endpoints.len();
        if len == 0 {
            return Ok(None);
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        for offset in 0..len {
            let endpoint = &self.endpoints[(start + offset) % len];
            let key = format!("{}:{}", endpoint.ip, endpoint.port);
            if !exclude.contains(&key) {
                return Ok(Some(self.issue(endpoint)));
            }
        }

        Ok(None)
    }
}
