//! Proxy snapshots and account bindings

use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// An issued egress proxy
///
/// Snapshots are never mutated: a refresh produces a new snapshot that
/// supersedes the old one.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxySnapshot {
    pub ip: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl ProxySnapshot {
    pub fn new(ip: impl Into<String>, port: u16, expires_at: DateTime<Utc>) -> Self {
        Self {
            ip: ip.into(),
            port,
            user: None,
            password: None,
            expires_at,
        }
    }

    pub fn with_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// `ip:port`, the key used for blacklisting and as the bound proxy id
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// Renders the proxy as an `http://` URL usable by an HTTP client
    pub fn proxy_url(&self) -> String {
        match (&self.user, &self.password) {
            (Some(user), Some(password)) => {
                format!("http://{}:{}@{}:{}", user, password, self.ip, self.port)
            }
            _ => format!("http://{}:{}", self.ip, self.port),
        }
    }

    /// Returns true if the snapshot expires within `buffer` of `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        self.expires_at - buffer <= now
    }
}

impl fmt::Debug for ProxySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxySnapshot")
            .field("ip", &self.ip)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// An account pinned to a proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyBinding {
    pub account_id: i64,
    pub proxy: ProxySnapshot,
    pub bound_at: DateTime<Utc>,
}
