//! Credential health verification

use crate::state::AccountStatus;
use crate::storage::AccountRecord;
use async_trait::async_trait;

/// What a platform said about a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialVerdict {
    Valid,
    Expired,
    Banned,
    /// The probe was inconclusive (network error, unexpected payload, ...)
    Unknown,
}

impl CredentialVerdict {
    /// Maps the verdict onto the account status it implies
    pub fn implied_status(&self) -> AccountStatus {
        match self {
            Self::Valid => AccountStatus::Active,
            Self::Expired => AccountStatus::Expired,
            Self::Banned => AccountStatus::Banned,
            Self::Unknown => AccountStatus::Unknown,
        }
    }
}

/// Result of probing one credential
///
/// An invalid credential is an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialCheck {
    pub verdict: CredentialVerdict,
    pub reason: String,
}

impl CredentialCheck {
    pub fn new(verdict: CredentialVerdict, reason: impl Into<String>) -> Self {
        Self {
            verdict,
            reason: reason.into(),
        }
    }

    pub fn valid() -> Self {
        Self::new(CredentialVerdict::Valid, "credential accepted")
    }
}

/// Platform-specific credential probe, implemented by the host
///
/// Implementations turn transport failures into
/// [`CredentialVerdict::Unknown`] rather than failing.
#[async_trait]
pub trait HealthVerifier: Send + Sync {
    async fn verify(&self, account: &AccountRecord) -> CredentialCheck;
}

/// Verifier for hosts that do not probe credentials; every probe is inconclusive
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopVerifier;

#[async_trait]
impl HealthVerifier for NoopVerifier {
    async fn verify(&self, _account: &AccountRecord) -> CredentialCheck {
        CredentialCheck::new(CredentialVerdict::Unknown, "no verifier configured")
    }
}
