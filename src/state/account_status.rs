/// Account status definitions
///
/// Statuses are ordered by severity so that concurrent writers can resolve
/// disagreements by keeping the most severe value instead of the last one.
use std::fmt;

/// Represents the current status of a crawl account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountStatus {
    /// Credential has not been verified, or the last probe was inconclusive
    Unknown,

    /// Account may be selected
    Active,

    /// Account health dropped below the floor; waiting out its cooldown
    Cooldown,

    /// Credential expired (logged out, cookie revoked)
    Expired,

    /// Platform banned the account
    Banned,
}

impl AccountStatus {
    /// Severity rank used by the "most severe wins" rule
    ///
    /// `Unknown` ranks lowest: an inconclusive probe must never hide a known
    /// status, and a successful probe may resolve it.
    pub fn severity(&self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Active => 1,
            Self::Cooldown => 2,
            Self::Expired => 3,
            Self::Banned => 4,
        }
    }

    /// Returns whichever of the two statuses is more severe
    pub fn most_severe(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// Returns true if the credential itself is unusable until an operator acts
    pub fn is_dead(&self) -> bool {
        matches!(self, Self::Expired | Self::Banned)
    }

    /// Converts the status to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Active => "active",
            Self::Cooldown => "cooldown",
            Self::Expired => "expired",
            Self::Banned => "banned",
        }
    }

    /// Parses a status from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(Self::Unknown),
            "active" => Some(Self::Active),
            "cooldown" => Some(Self::Cooldown),
            "expired" => Some(Self::Expired),
            "banned" => Some(Self::Banned),
            _ => None,
        }
    }

    /// Returns all account statuses
    pub fn all_statuses() -> [Self; 5] {
        [
            Self::Unknown,
            Self::Active,
            Self::Cooldown,
            Self::Expired,
            Self::Banned,
        ]
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
