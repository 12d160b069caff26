/// Checkpoint status definitions
use std::fmt;

/// Status of a crawl checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckpointStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

impl CheckpointStatus {
    /// Returns true if no further progress can be recorded
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if `find_matching_checkpoint` may hand this checkpoint back
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Checks whether moving from `self` to `next` is allowed
    ///
    /// running → {running, paused, completed, failed}
    /// paused → {paused, running, completed, failed}
    /// completed and failed only accept themselves, so re-saving a finished
    /// record stays idempotent.
    pub fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Running | Self::Paused => true,
            Self::Completed | Self::Failed => *self == next,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_status_roundtrip() {
        for status in &[
            CheckpointStatus::Running,
            CheckpointStatus::Paused,
            CheckpointStatus::Completed,
            CheckpointStatus::Failed,
        ] {
            let db_str = status.to_db_string();
            assert_eq!(Some(*status), CheckpointStatus::from_db_string(db_str));
        }
        assert_eq!(CheckpointStatus::from_db_string("invalid"), None);
    }

    #[test]
    fn test_transitions() {
        use CheckpointStatus::*;

        assert!(Running.can_transition_to(Running));
        assert!(Running.can_transition_to(Paused));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(Paused.can_transition_to(Running));

        assert!(!Completed.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Paused));
        assert!(Completed.can_transition_to(Completed));
    }

    #[test]
    fn test_terminal_and_resumable() {
        assert!(CheckpointStatus::Completed.is_terminal());
        assert!(CheckpointStatus::Failed.is_terminal());
        assert!(!CheckpointStatus::Paused.is_terminal());
        assert!(CheckpointStatus::Paused.is_resumable());
        assert!(!CheckpointStatus::Failed.is_resumable());
    }
}
