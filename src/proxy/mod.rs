//! Proxy affinity module
//!
//! This module pins accounts to egress proxies:
//! - Issued proxy snapshots and persisted account bindings
//! - Candidate sources ([`ProxyProvider`]) and validation pings ([`ProxyValidator`])
//! - Per-endpoint failure counting and blacklisting
//! - The [`ProxyAffinityBinder`] service tying these together

mod binder;
mod blacklist;
mod provider;
mod snapshot;
mod validator;

pub use binder::ProxyAffinityBinder;
pub use blacklist::IpFailureTracker;
pub use provider::{ProxyProvider, StaticProxyProvider};
pub use snapshot::{ProxyBinding, ProxySnapshot};
pub use validator::{HttpProxyValidator, ProxyValidator};

use thiserror::Error;

/// Errors that can occur while acquiring or validating a proxy
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("No usable proxy for account {account_id} after {attempts} attempts")]
    Exhausted { account_id: i64, attempts: u32 },

    #[error("Proxy validation failed for {endpoint}: {reason}")]
    Validation { endpoint: String, reason: String },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}
