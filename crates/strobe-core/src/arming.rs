//! [`ArmingCollection`]: the triggers that fired for one activation of a unit.
//!
//! The scheduler records a [`Trigger`] into a unit's pending collection
//! every time one of its conditions fires. Several condition kinds may fire
//! for the same unit in the same frame; their triggers accumulate in firing
//! order. At dispatch the pending collection is moved into the activation,
//! handed to `compute` and `commit`, and dropped after commit.

use std::time::Duration;

use smallvec::SmallVec;

use crate::condition::ConditionKind;
use crate::id::{ConditionId, EventId, FrameId};
use crate::input::InputEvent;

/// One firing of one condition leaf.
#[derive(Clone, Debug, PartialEq)]
pub enum Trigger {
    /// A `NewFrame` leaf fired at a frame tick.
    NewFrame {
        /// The condition that fired.
        condition: ConditionId,
        /// The frame whose tick fired it.
        frame: FrameId,
    },
    /// A `TimerExpired` leaf fired.
    TimerExpired {
        /// The condition that fired.
        condition: ConditionId,
        /// Time since the timer was armed or last fired.
        elapsed: Duration,
    },
    /// A `PostEvent` leaf matched a posted event.
    PostEvent {
        /// The condition that fired.
        condition: ConditionId,
        /// The posted event.
        event: EventId,
    },
    /// An `Input` leaf found buffered input at a frame tick.
    Input {
        /// The condition that fired.
        condition: ConditionId,
        /// The drained events, oldest first.
        events: Vec<InputEvent>,
    },
}

impl Trigger {
    /// The condition this trigger was produced by.
    pub fn condition(&self) -> ConditionId {
        match self {
            Self::NewFrame { condition, .. }
            | Self::TimerExpired { condition, .. }
            | Self::PostEvent { condition, .. }
            | Self::Input { condition, .. } => *condition,
        }
    }

    /// Kind of the leaf that fired.
    pub fn kind(&self) -> ConditionKind {
        match self {
            Self::NewFrame { .. } => ConditionKind::NewFrame,
            Self::TimerExpired { .. } => ConditionKind::TimerExpired,
            Self::PostEvent { .. } => ConditionKind::PostEvent,
            Self::Input { .. } => ConditionKind::Input,
        }
    }
}

/// Accumulated triggers for one activation of a unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArmingCollection {
    triggers: SmallVec<[Trigger; 4]>,
}

impl ArmingCollection {
    /// An empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a trigger.
    pub fn push(&mut self, trigger: Trigger) {
        self.triggers.push(trigger);
    }

    /// Number of recorded triggers.
    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    /// Whether nothing has fired.
    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Remove every trigger.
    pub fn clear(&mut self) {
        self.triggers.clear();
    }

    /// Move the triggers out, leaving this collection empty.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Triggers in firing order.
    pub fn iter(&self) -> std::slice::Iter<'_, Trigger> {
        self.triggers.iter()
    }

    /// Whether a leaf of the given kind fired.
    pub fn fired(&self, kind: ConditionKind) -> bool {
        self.triggers.iter().any(|t| t.kind() == kind)
    }

    /// Whether the given condition fired.
    pub fn fired_condition(&self, condition: ConditionId) -> bool {
        self.triggers.iter().any(|t| t.condition() == condition)
    }

    /// Posted events, in posting order.
    pub fn posted_events(&self) -> impl Iterator<Item = EventId> + '_ {
        self.triggers.iter().filter_map(|t| match t {
            Trigger::PostEvent { event, .. } => Some(*event),
            _ => None,
        })
    }

    /// Input events from every `Input` trigger, oldest first.
    pub fn input_events(&self) -> impl Iterator<Item = &InputEvent> + '_ {
        self.triggers.iter().flat_map(|t| match t {
            Trigger::Input { events, .. } => events.as_slice(),
            _ => &[],
        })
    }
}

impl<'a> IntoIterator for &'a ArmingCollection {
    type Item = &'a Trigger;
    type IntoIter = std::slice::Iter<'a, Trigger>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ArmingCollection {
        let mut c = ArmingCollection::new();
        c.push(Trigger::NewFrame {
            condition: ConditionId(1),
            frame: FrameId(4),
        });
        c.push(Trigger::PostEvent {
            condition: ConditionId(2),
            event: EventId(10),
        });
        c.push(Trigger::Input {
            condition: ConditionId(3),
            events: vec![InputEvent::Custom { code: 1 }, InputEvent::Custom { code: 2 }],
        });
        c.push(Trigger::PostEvent {
            condition: ConditionId(2),
            event: EventId(11),
        });
        c
    }

    #[test]
    fn kinds_accumulate_rather_than_replace() {
        let c = sample();
        assert_eq!(c.len(), 4);
        assert!(c.fired(ConditionKind::NewFrame));
        assert!(c.fired(ConditionKind::PostEvent));
        assert!(c.fired(ConditionKind::Input));
        assert!(!c.fired(ConditionKind::TimerExpired));
    }

    #[test]
    fn posted_events_keep_order() {
        let events: Vec<_> = sample().posted_events().collect();
        assert_eq!(events, vec![EventId(10), EventId(11)]);
    }

    #[test]
    fn input_events_are_flattened() {
        let c = sample();
        let codes: Vec<_> = c
            .input_events()
            .map(|e| match e {
                InputEvent::Custom { code } => *code,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(codes, vec![1, 2]);
    }

    #[test]
    fn take_leaves_empty() {
        let mut c = sample();
        let taken = c.take();
        assert!(c.is_empty());
        assert_eq!(taken.len(), 4);
        assert!(taken.fired_condition(ConditionId(3)));
        assert!(!taken.fired_condition(ConditionId(9)));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn posted_events_match_push_order(
                events in prop::collection::vec(any::<u32>(), 0..32),
            ) {
                let mut c = ArmingCollection::new();
                for (i, &e) in events.iter().enumerate() {
                    c.push(Trigger::PostEvent {
                        condition: ConditionId(i as u64 % 3),
                        event: EventId(e),
                    });
                    if i % 4 == 0 {
                        c.push(Trigger::NewFrame {
                            condition: ConditionId(99),
                            frame: FrameId(i as u64),
                        });
                    }
                }
                let seen: Vec<u32> = c.posted_events().map(|e| e.0).collect();
                prop_assert_eq!(&seen, &events);
                prop_assert_eq!(c.fired(ConditionKind::NewFrame), !events.is_empty());

                let taken = c.take();
                prop_assert!(c.is_empty());
                prop_assert_eq!(taken.posted_events().count(), events.len());
            }
        }
    }
}
