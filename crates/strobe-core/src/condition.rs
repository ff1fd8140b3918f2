//! Arming conditions: the stimuli that wake a processor unit.
//!
//! An [`ArmingCondition`] is a description. Arming it with the scheduler
//! registers each leaf in a bucket keyed by trigger kind and returns a
//! [`ConditionId`](crate::ConditionId) that references exactly one owning
//! unit.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use smallvec::SmallVec;

use crate::error::ConditionError;
use crate::id::EventId;
use crate::input::InputSource;

/// A trigger predicate attached to one processor unit.
#[derive(Clone)]
pub enum ArmingCondition {
    /// Fires on every frame tick.
    NewFrame,
    /// Fires once `period` has elapsed since arming or since the last fire.
    TimerExpired {
        /// Minimum time between fires.
        period: Duration,
    },
    /// Fires when any of the listed events is posted.
    PostEvent {
        /// Event ids this condition listens to.
        events: SmallVec<[EventId; 4]>,
    },
    /// Fires at a frame tick when the source has buffered input pending.
    Input {
        /// The polled input source.
        source: Arc<dyn InputSource>,
    },
    /// Fires when any child fires. Children are registered as leaves of a
    /// single condition; nested `AnyOf`s are flattened.
    AnyOf(Vec<ArmingCondition>),
}

/// Discriminant of an [`ArmingCondition`] leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    /// [`ArmingCondition::NewFrame`].
    NewFrame,
    /// [`ArmingCondition::TimerExpired`].
    TimerExpired,
    /// [`ArmingCondition::PostEvent`].
    PostEvent,
    /// [`ArmingCondition::Input`].
    Input,
    /// [`ArmingCondition::AnyOf`].
    AnyOf,
}

impl ArmingCondition {
    /// A timer condition with the given period.
    pub fn timer(period: Duration) -> Self {
        Self::TimerExpired { period }
    }

    /// A post-event condition listening to `events`.
    pub fn post_event(events: impl IntoIterator<Item = EventId>) -> Self {
        Self::PostEvent {
            events: events.into_iter().collect(),
        }
    }

    /// An input condition polling `source`.
    pub fn input(source: Arc<dyn InputSource>) -> Self {
        Self::Input { source }
    }

    /// A combinator that fires when any child fires.
    pub fn any_of(children: impl IntoIterator<Item = ArmingCondition>) -> Self {
        Self::AnyOf(children.into_iter().collect())
    }

    /// The kind of this condition.
    pub fn kind(&self) -> ConditionKind {
        match self {
            Self::NewFrame => ConditionKind::NewFrame,
            Self::TimerExpired { .. } => ConditionKind::TimerExpired,
            Self::PostEvent { .. } => ConditionKind::PostEvent,
            Self::Input { .. } => ConditionKind::Input,
            Self::AnyOf(_) => ConditionKind::AnyOf,
        }
    }

    /// Check structural validity. Recurses into `AnyOf` children.
    pub fn validate(&self) -> Result<(), ConditionError> {
        match self {
            Self::NewFrame | Self::Input { .. } => Ok(()),
            Self::TimerExpired { period } => {
                if period.is_zero() {
                    Err(ConditionError::ZeroTimerPeriod { period: *period })
                } else {
                    Ok(())
                }
            }
            Self::PostEvent { events } => {
                if events.is_empty() {
                    Err(ConditionError::NoEvents)
                } else {
                    Ok(())
                }
            }
            Self::AnyOf(children) => {
                if children.is_empty() {
                    return Err(ConditionError::EmptyAnyOf);
                }
                children.iter().try_for_each(Self::validate)
            }
        }
    }

    /// Every non-`AnyOf` leaf of this condition, depth-first in declaration
    /// order.
    pub fn leaves(&self) -> Vec<&ArmingCondition> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a ArmingCondition>) {
        match self {
            Self::AnyOf(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
            leaf => out.push(leaf),
        }
    }
}

impl fmt::Debug for ArmingCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewFrame => f.write_str("NewFrame"),
            Self::TimerExpired { period } => f
                .debug_struct("TimerExpired")
                .field("period", period)
                .finish(),
            Self::PostEvent { events } => {
                f.debug_struct("PostEvent").field("events", events).finish()
            }
            Self::Input { .. } => f.debug_struct("Input").finish_non_exhaustive(),
            Self::AnyOf(children) => f.debug_tuple("AnyOf").field(children).finish(),
        }
    }
}
