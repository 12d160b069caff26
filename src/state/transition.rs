//! Account status transitions
//!
//! Usage outcomes, health probes and operator overrides all mutate an
//! [`AccountRecord`] through [`apply_transition`]. Automatic transitions
//! never lower status severity; only [`Transition::Override`] may.

use crate::state::AccountStatus;
use crate::storage::AccountRecord;
use chrono::{DateTime, Duration, Utc};

/// Health gained per successful use
pub const HEALTH_SUCCESS_STEP: u8 = 5;

/// Health lost per failed use
pub const HEALTH_FAILURE_STEP: u8 = 10;

/// Upper bound of the health score
pub const MAX_HEALTH: u8 = 100;

/// Longest cooldown any transition applies (one year)
pub const MAX_COOLDOWN_SECS: i64 = 365 * 24 * 3600;

/// Converts a caller-supplied cooldown, capped at [`MAX_COOLDOWN_SECS`]
pub fn cooldown_from_secs(secs: u64) -> Duration {
    let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(MAX_COOLDOWN_SECS);
    Duration::seconds(secs)
}

fn max_cooldown() -> Duration {
    Duration::seconds(MAX_COOLDOWN_SECS)
}

fn clamp_cooldown(cooldown: Duration) -> Duration {
    cooldown.clamp(Duration::zero(), max_cooldown())
}

fn cooldown_deadline(now: DateTime<Utc>, cooldown: Duration) -> DateTime<Utc> {
    now.checked_add_signed(cooldown).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Policy knobs the transition function needs
#[derive(Debug, Clone, Copy)]
pub struct TransitionPolicy {
    /// Accounts below this health are put into cooldown and never selected
    pub min_health: u8,
    /// Cooldown applied after every use when the caller gives none
    pub base_cooldown: Duration,
    /// Cap on the exponential backoff multiplier
    pub max_backoff_multiplier: u32,
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        Self {
            min_health: 30,
            base_cooldown: Duration::seconds(300),
            max_backoff_multiplier: 32,
        }
    }
}

/// An event that changes an account
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The account was used for a request
    Used {
        success: bool,
        cooldown: Option<Duration>,
        project_id: Option<String>,
    },
    /// A credential probe returned a verdict, already mapped to a status
    Probed {
        status: AccountStatus,
        reason: String,
    },
    /// An operator set the status explicitly
    Override {
        status: AccountStatus,
        reason: String,
    },
}

/// What a transition did to the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub previous_status: AccountStatus,
    pub status: AccountStatus,
    /// Cooldown applied by a usage transition
    pub cooldown: Option<Duration>,
}

impl TransitionOutcome {
    pub fn status_changed(&self) -> bool {
        self.previous_status != self.status
    }
}

/// Cooldown for the Nth consecutive failure: `base × min(cap, 2^(n−1))`
///
/// `consecutive_fails` of zero is treated as one. The result never exceeds
/// [`MAX_COOLDOWN_SECS`].
pub fn backoff_cooldown(base: Duration, consecutive_fails: u32, max_multiplier: u32) -> Duration {
    let exponent = consecutive_fails.saturating_sub(1).min(30);
    let multiplier = (1u32 << exponent).min(max_multiplier.max(1));
    let multiplier = i32::try_from(multiplier).unwrap_or(i32::MAX);
    clamp_cooldown(base)
        .checked_mul(multiplier)
        .map(clamp_cooldown)
        .unwrap_or_else(max_cooldown)
}

/// Applies a transition to an account record
///
/// This is the only function that writes account status or counters.
/// Callers hold the account's lock for the whole read-modify-write.
pub fn apply_transition(
    record: &mut AccountRecord,
    transition: &Transition,
    policy: &TransitionPolicy,
    now: DateTime<Utc>,
) -> TransitionOutcome {
    let previous_status = record.status;
    let mut cooldown = None;

    match transition {
        Transition::Used {
            success,
            cooldown: requested,
            project_id,
        } => {
            record.daily_use_count = record.daily_usage_at(now).saturating_add(1);
            record.use_count += 1;
            record.last_used = Some(now);
            if let Some(project_id) = project_id {
                record.last_project_id = Some(project_id.clone());
            }

            if *success {
                record.success_count += 1;
                record.consecutive_fails = 0;
                record.health_score = record
                    .health_score
                    .saturating_add(HEALTH_SUCCESS_STEP)
                    .min(MAX_HEALTH);

                let applied = clamp_cooldown(requested.unwrap_or(policy.base_cooldown));
                record.cooldown_until = Some(cooldown_deadline(now, applied));
                cooldown = Some(applied);

                if record.status == AccountStatus::Cooldown
                    && record.health_score >= policy.min_health
                {
                    record.status = AccountStatus::Active;
                    record.status_reason = Some("health recovered".to_string());
                }
            } else {
                record.fail_count += 1;
                record.consecutive_fails = record.consecutive_fails.saturating_add(1);
                record.health_score = record.health_score.saturating_sub(HEALTH_FAILURE_STEP);

                let base = requested.unwrap_or(policy.base_cooldown);
                let applied = backoff_cooldown(
                    base,
                    record.consecutive_fails,
                    policy.max_backoff_multiplier,
                );
                let until = cooldown_deadline(now, applied);
                record.cooldown_until = Some(match record.cooldown_until {
                    Some(existing) if existing > until => existing,
                    _ => until,
                });
                cooldown = Some(applied);

                if record.health_score < policy.min_health {
                    let escalated = record.status.most_severe(AccountStatus::Cooldown);
                    if escalated != record.status {
                        record.status = escalated;
                        record.status_reason = Some(format!(
                            "health {} below floor {}",
                            record.health_score, policy.min_health
                        ));
                    }
                }
            }
        }
        Transition::Probed { status, reason } => {
            record.last_check = Some(now);
            record.status_reason = Some(reason.clone());

            // A cooldown is temporary: once it has elapsed it no longer
            // outranks a probe that found the credential valid.
            let current = if record.status == AccountStatus::Cooldown
                && !record.is_cooling_down_at(now)
            {
                AccountStatus::Active
            } else {
                record.status
            };
            let next = current.most_severe(*status);
            if next == AccountStatus::Active && record.health_score < policy.min_health {
                record.health_score = policy.min_health;
            }
            record.status = next;
        }
        Transition::Override { status, reason } => {
            record.status = *status;
            record.status_reason = Some(reason.clone());
            if *status == AccountStatus::Active {
                record.consecutive_fails = 0;
                record.health_score = record.health_score.max(policy.min_health);
            }
        }
    }

    record.health_score = record.health_score.min(MAX_HEALTH);
    record.updated_at = now;

    TransitionOutcome {
        previous_status,
        status: record.status,
        cooldown,
    }
}
