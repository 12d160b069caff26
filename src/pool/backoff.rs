//! Exponential cooldowns and the per-platform circuit breaker

use crate::config::{CircuitBreakerConfig, PoolConfig};
use crate::platform::Platform;
use crate::state::backoff_cooldown;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;

/// Tracks recent failures per platform and computes cooldowns
///
/// The breaker for a platform is open while the trailing window holds at
/// least `threshold` failures. It closes on its own as entries age out.
#[derive(Debug)]
pub struct FailureBackoffController {
    windows: DashMap<Platform, VecDeque<DateTime<Utc>>>,
    window: Duration,
    threshold: usize,
    base_cooldown: Duration,
    max_multiplier: u32,
}

impl FailureBackoffController {
    pub fn new(
        window: Duration,
        threshold: usize,
        base_cooldown: Duration,
        max_multiplier: u32,
    ) -> Self {
        Self {
            windows: DashMap::new(),
            window,
            threshold: threshold.max(1),
            base_cooldown,
            max_multiplier,
        }
    }

    pub fn from_config(breaker: &CircuitBreakerConfig, pool: &PoolConfig) -> Self {
        Self::new(
            Duration::seconds(breaker.window_secs as i64),
            breaker.threshold,
            Duration::seconds(pool.base_cooldown_secs as i64),
            pool.max_backoff_multiplier,
        )
    }

    /// Cooldown for the Nth consecutive failure
    pub fn cooldown_for(&self, consecutive_fails: u32) -> Duration {
        backoff_cooldown(self.base_cooldown, consecutive_fails, self.max_multiplier)
    }

    pub fn record_platform_failure(&self, platform: Platform) {
        self.record_platform_failure_at(platform, Utc::now());
    }

    /// Appends a failure at `now` and prunes the window
    pub fn record_platform_failure_at(&self, platform: Platform, now: DateTime<Utc>) {
        let mut window = self.windows.entry(platform).or_default();
        window.push_back(now);
        Self::prune(&mut window, now - self.window);

        if window.len() == self.threshold {
            tracing::warn!(
                "[AccountPool] Circuit breaker opened for {}: {} failures in {}s",
                platform,
                window.len(),
                self.window.num_seconds()
            );
        }
    }

    pub fn is_platform_panicked(&self, platform: Platform) -> bool {
        self.is_platform_panicked_at(platform, Utc::now())
    }

    pub fn is_platform_panicked_at(&self, platform: Platform, now: DateTime<Utc>) -> bool {
        self.failures_in_window_at(platform, now) >= self.threshold
    }

    /// Number of failures inside the trailing window at `now`
    pub fn failures_in_window_at(&self, platform: Platform, now: DateTime<Utc>) -> usize {
        match self.windows.get_mut(&platform) {
            Some(mut window) => {
                Self::prune(&mut window, now - self.window);
                window.len()
            }
            None => 0,
        }
    }

    /// Instant the oldest failure in the window ages out, if any
    pub fn reopens_at(&self, platform: Platform) -> Option<DateTime<Utc>> {
        self.reopens_at_from(platform, Utc::now())
    }

    pub fn reopens_at_from(&self, platform: Platform, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut window = self.windows.get_mut(&platform)?;
        Self::prune(&mut window, now - self.window);
        window.front().map(|oldest| *oldest + self.window)
    }

    fn prune(window: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
        while window.front().map(|t| *t <= cutoff).unwrap_or(false) {
            window.pop_front();
        }
    }
}

impl Default for FailureBackoffController {
    fn default() -> Self {
        Self::from_config(&CircuitBreakerConfig::default(), &PoolConfig::default())
    }
}
