//! Errors returned by the scheduler's registration and arming API.
//!
//! These report misuse at the call site. Failures inside a frame (unit
//! errors, chain corruption) are logged and isolated instead.

use strobe_core::{ConditionError, OwnerId, UnitId};
use thiserror::Error;

/// Error from a [`Scheduler`](crate::Scheduler) operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The unit id is stale or was never issued.
    #[error("unknown unit {0}")]
    UnknownUnit(UnitId),
    /// The condition failed structural validation.
    #[error("invalid condition: {0}")]
    InvalidCondition(#[from] ConditionError),
    /// Linking would close a cycle (including a unit linked to itself).
    #[error("linking {head} -> {next} would create a chain cycle")]
    ChainCycle {
        /// The unit whose successor was being set.
        head: UnitId,
        /// The proposed successor.
        next: UnitId,
    },
    /// The proposed successor already follows another unit.
    #[error("unit {unit} already follows {predecessor} in a chain")]
    AlreadyChained {
        /// The proposed successor.
        unit: UnitId,
        /// Its current predecessor.
        predecessor: UnitId,
    },
    /// The unit is already attached to an owner.
    #[error("unit {unit} is already attached to owner {owner}")]
    AlreadyAttached {
        /// The unit.
        unit: UnitId,
        /// The owner it is attached to.
        owner: OwnerId,
    },
    /// The scheduler has been shut down.
    #[error("scheduler is shut down")]
    ShuttingDown,
}
