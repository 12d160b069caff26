//! Per-endpoint failure counting

use dashmap::{DashMap, DashSet};
use std::collections::HashSet;

/// Counts consecutive failures per `ip:port` and blacklists repeat offenders
///
/// The blacklist lives in memory only; a restart gives every endpoint a
/// clean slate.
#[derive(Debug)]
pub struct IpFailureTracker {
    failures: DashMap<String, u32>,
    blacklist: DashSet<String>,
    max_failures: u32,
}

impl IpFailureTracker {
    pub fn new(max_failures: u32) -> Self {
        Self {
            failures: DashMap::new(),
            blacklist: DashSet::new(),
            max_failures: max_failures.max(1),
        }
    }

    /// Records a failure for an endpoint
    ///
    /// # Returns
    ///
    /// `true` if this failure pushed the endpoint onto the blacklist
    pub fn record_failure(&self, endpoint: &str) -> bool {
        let count = {
            let mut entry = self.failures.entry(endpoint.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        count >= self.max_failures && self.blacklist.insert(endpoint.to_string())
    }

    /// Resets the failure counter of an endpoint
    pub fn record_success(&self, endpoint: &str) {
        self.failures.remove(endpoint);
    }

    pub fn failure_count(&self, endpoint: &str) -> u32 {
        self.failures.get(endpoint).map(|count| *count).unwrap_or(0)
    }

    pub fn is_blacklisted(&self, endpoint: &str) -> bool {
        self.blacklist.contains(endpoint)
    }

    /// Returns a copy of the blacklist, used to exclude candidates
    pub fn blacklisted(&self) -> HashSet<String> {
        self.blacklist.iter().map(|entry| entry.key().clone()).collect()
    }
}
