//! Error types shared across the Strobe workspace.
//!
//! Unit failures ([`ProcessorError`]) are isolated and logged by the
//! scheduler; they never escape a frame. [`ConditionError`] reports a
//! malformed arming condition at `arm` time.

use std::time::Duration;

use thiserror::Error;

/// Error returned by a unit's `compute` or `commit` phase.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProcessorError {
    /// The phase failed for an application-specific reason.
    #[error("execution failed: {reason}")]
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// A collaborator the unit depends on was not available.
    #[error("collaborator unavailable: {name}")]
    Unavailable {
        /// Name of the missing collaborator.
        name: String,
    },
}

impl ProcessorError {
    /// Shorthand for [`ProcessorError::ExecutionFailed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            reason: reason.into(),
        }
    }
}

/// A structurally invalid arming condition.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConditionError {
    /// A timer period of zero would fire on every tick; use `NewFrame`.
    #[error("timer period must be non-zero, got {period:?}")]
    ZeroTimerPeriod {
        /// The rejected period.
        period: Duration,
    },
    /// A post-event condition listens to no events and could never fire.
    #[error("post-event condition has no event ids")]
    NoEvents,
    /// An `AnyOf` combinator with no children could never fire.
    #[error("any-of condition has no children")]
    EmptyAnyOf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_shorthand_builds_execution_failed() {
        let err = ProcessorError::failed("boom");
        assert_eq!(
            err,
            ProcessorError::ExecutionFailed {
                reason: "boom".into()
            }
        );
        assert_eq!(err.to_string(), "execution failed: boom");
    }

    #[test]
    fn condition_errors_display() {
        let err = ConditionError::ZeroTimerPeriod {
            period: Duration::ZERO,
        };
        assert!(err.to_string().contains("non-zero"));
        assert_eq!(
            ConditionError::NoEvents.to_string(),
            "post-event condition has no event ids"
        );
    }
}
