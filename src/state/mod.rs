//! State module for account and checkpoint lifecycles
//!
//! # Components
//!
//! - `AccountStatus`: account status with a severity order
//! - `CheckpointStatus`: checkpoint state machine
//! - `apply_transition`: the single function through which every account
//!   mutation passes

mod account_status;
mod checkpoint_status;
mod transition;

pub use account_status::AccountStatus;
pub use checkpoint_status::CheckpointStatus;
pub use transition::{
    apply_transition, backoff_cooldown, cooldown_from_secs, Transition, TransitionOutcome,
    TransitionPolicy, MAX_COOLDOWN_SECS,
};
