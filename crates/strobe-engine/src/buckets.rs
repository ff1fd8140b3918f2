//! Armed conditions, bucketed by kind for cheap per-frame firing.
//!
//! New-frame conditions sit in an ordered set. Timers are keyed by expiry
//! so a frame only touches the timers that are due. Post-event conditions
//! are indexed by event id. Input conditions are polled every frame. An
//! `AnyOf` condition registers each leaf under the same [`ConditionId`],
//! so a disarm removes all of them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use indexmap::{IndexMap, IndexSet};
use strobe_core::{
    ArmingCondition, ConditionError, ConditionId, EventId, FrameId, InputSource, Trigger, UnitId,
};

/// A condition that fired, and the unit it belongs to.
pub(crate) type Fired = Vec<(UnitId, Trigger)>;

struct Armed {
    unit: UnitId,
    condition: ArmingCondition,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct TimerKey {
    expiry: Duration,
    condition: ConditionId,
    leaf: u16,
}

struct TimerEntry {
    period: Duration,
    armed_at: Duration,
}

/// Number of registrations in each bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BucketSizes {
    /// Armed conditions (an `AnyOf` counts once).
    pub conditions: usize,
    /// New-frame leaves.
    pub new_frame: usize,
    /// Timer leaves.
    pub timers: usize,
    /// `(event, condition)` registrations.
    pub post_events: usize,
    /// Input leaves.
    pub inputs: usize,
}

#[derive(Default)]
pub(crate) struct ConditionBuckets {
    next_id: u64,
    armed: IndexMap<ConditionId, Armed>,
    new_frame: IndexSet<ConditionId>,
    timers: BTreeMap<TimerKey, TimerEntry>,
    timer_keys: IndexMap<(ConditionId, u16), TimerKey>,
    post_events: IndexMap<EventId, IndexSet<ConditionId>>,
    inputs: IndexMap<(ConditionId, u16), Arc<dyn InputSource>>,
}

impl ConditionBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register `condition` for `unit`. Timers start counting
    /// from `now`.
    pub fn arm(
        &mut self,
        unit: UnitId,
        condition: ArmingCondition,
        now: Duration,
    ) -> Result<ConditionId, ConditionError> {
        condition.validate()?;
        self.next_id += 1;
        let id = ConditionId(self.next_id);
        for (leaf, node) in condition.leaves().into_iter().enumerate() {
            let leaf = leaf as u16;
            match node {
                ArmingCondition::NewFrame => {
                    self.new_frame.insert(id);
                }
                ArmingCondition::TimerExpired { period } => {
                    let key = TimerKey {
                        expiry: now.saturating_add(*period),
                        condition: id,
                        leaf,
                    };
                    self.timers.insert(
                        key,
                        TimerEntry {
                            period: *period,
                            armed_at: now,
                        },
                    );
                    self.timer_keys.insert((id, leaf), key);
                }
                ArmingCondition::PostEvent { events } => {
                    for event in events {
                        self.post_events.entry(*event).or_default().insert(id);
                    }
                }
                ArmingCondition::Input { source } => {
                    self.inputs.insert((id, leaf), Arc::clone(source));
                }
                ArmingCondition::AnyOf(_) => {}
            }
        }
        self.armed.insert(id, Armed { unit, condition });
        Ok(id)
    }

    /// Remove a condition from every bucket it occupies. Idempotent:
    /// returns the owning unit only on the first call.
    pub fn disarm(&mut self, id: ConditionId) -> Option<UnitId> {
        let armed = self.armed.shift_remove(&id)?;
        for (leaf, node) in armed.condition.leaves().into_iter().enumerate() {
            let leaf = leaf as u16;
            match node {
                ArmingCondition::NewFrame => {
                    self.new_frame.shift_remove(&id);
                }
                ArmingCondition::TimerExpired { .. } => {
                    if let Some(key) = self.timer_keys.shift_remove(&(id, leaf)) {
                        self.timers.remove(&key);
                    }
                }
                ArmingCondition::PostEvent { events } => {
                    for event in events {
                        let emptied = match self.post_events.get_mut(event) {
                            Some(set) => {
                                set.shift_remove(&id);
                                set.is_empty()
                            }
                            None => false,
                        };
                        if emptied {
                            self.post_events.shift_remove(event);
                        }
                    }
                }
                ArmingCondition::Input { .. } => {
                    self.inputs.shift_remove(&(id, leaf));
                }
                ArmingCondition::AnyOf(_) => {}
            }
        }
        Some(armed.unit)
    }

    pub fn unit_of(&self, id: ConditionId) -> Option<UnitId> {
        self.armed.get(&id).map(|a| a.unit)
    }

    pub fn fire_new_frame(&self, frame: FrameId) -> Fired {
        self.new_frame
            .iter()
            .filter_map(|id| {
                let unit = self.unit_of(*id)?;
                Some((
                    unit,
                    Trigger::NewFrame {
                        condition: *id,
                        frame,
                    },
                ))
            })
            .collect()
    }

    /// Fire every timer whose period has elapsed by `now` and restart it
    /// from `now`. A timer fires at most once per call, however many
    /// periods were missed.
    pub fn fire_timers(&mut self, now: Duration) -> Fired {
        let mut fired = Vec::new();
        let mut rearm = Vec::new();
        while let Some(entry) = self.timers.first_entry() {
            if entry.key().expiry > now {
                break;
            }
            let (key, timer) = entry.remove_entry();
            if let Some(unit) = self.unit_of(key.condition) {
                fired.push((
                    unit,
                    Trigger::TimerExpired {
                        condition: key.condition,
                        elapsed: now.saturating_sub(timer.armed_at),
                    },
                ));
            }
            rearm.push((key, timer.period));
        }
        for (key, period) in rearm {
            let next = TimerKey {
                expiry: now.saturating_add(period),
                ..key
            };
            self.timers.insert(
                next,
                TimerEntry {
                    period,
                    armed_at: now,
                },
            );
            self.timer_keys.insert((key.condition, key.leaf), next);
        }
        fired
    }

    /// Conditions registered for `event`, in arming order.
    pub fn distribute(&self, event: EventId) -> Fired {
        let Some(set) = self.post_events.get(&event) else {
            return Vec::new();
        };
        set.iter()
            .filter_map(|id| {
                let unit = self.unit_of(*id)?;
                Some((
                    unit,
                    Trigger::PostEvent {
                        condition: *id,
                        event,
                    },
                ))
            })
            .collect()
    }

    /// Drain every input source that reports buffered events.
    pub fn poll_inputs(&self) -> Fired {
        let mut fired = Vec::new();
        for ((id, _), source) in &self.inputs {
            if !source.buffered_events_pending() {
                continue;
            }
            let events = source.drain_events();
            if events.is_empty() {
                continue;
            }
            if let Some(unit) = self.unit_of(*id) {
                fired.push((
                    unit,
                    Trigger::Input {
                        condition: *id,
                        events,
                    },
                ));
            }
        }
        fired
    }

    pub fn sizes(&self) -> BucketSizes {
        BucketSizes {
            conditions: self.armed.len(),
            new_frame: self.new_frame.len(),
            timers: self.timers.len(),
            post_events: self.post_events.values().map(IndexSet::len).sum(),
            inputs: self.inputs.len(),
        }
    }

    pub fn clear(&mut self) {
        self.armed.clear();
        self.new_frame.clear();
        self.timers.clear();
        self.timer_keys.clear();
        self.post_events.clear();
        self.inputs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use strobe_core::InputEvent;

    use parking_lot::Mutex;

    const UNIT: UnitId = UnitId::new(0, 0);
    const OTHER: UnitId = UnitId::new(1, 0);

    #[derive(Default)]
    struct QueueSource(Mutex<Vec<InputEvent>>);

    impl InputSource for QueueSource {
        fn buffered_events_pending(&self) -> bool {
            !self.0.lock().is_empty()
        }
        fn drain_events(&self) -> Vec<InputEvent> {
            std::mem::take(&mut *self.0.lock())
        }
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn new_frame_fires_every_frame() {
        let mut b = ConditionBuckets::new();
        let id = b.arm(UNIT, ArmingCondition::NewFrame, ms(0)).unwrap();
        for f in 1..=3 {
            let fired = b.fire_new_frame(FrameId(f));
            assert_eq!(fired.len(), 1);
            assert_eq!(fired[0].0, UNIT);
            assert_eq!(fired[0].1.condition(), id);
        }
    }

    #[test]
    fn timer_fires_once_per_period() {
        let mut b = ConditionBuckets::new();
        b.arm(UNIT, ArmingCondition::timer(ms(500)), ms(0)).unwrap();
        let mut fired_at = Vec::new();
        for tick in 1..=10u64 {
            let now = ms(60 * tick);
            if !b.fire_timers(now).is_empty() {
                fired_at.push(tick);
            }
        }
        assert_eq!(fired_at, vec![9]);
    }

    #[test]
    fn unbounded_timer_period_never_fires() {
        let mut b = ConditionBuckets::new();
        let id = b.arm(UNIT, ArmingCondition::timer(Duration::MAX), ms(1)).unwrap();
        assert_eq!(b.sizes().timers, 1);
        assert!(b.fire_timers(ms(10_000)).is_empty());
        assert!(b.fire_timers(Duration::MAX - ms(1)).is_empty());
        assert_eq!(b.disarm(id), Some(UNIT));
        assert_eq!(b.sizes().timers, 0);
    }

    #[test]
    fn rearm_near_clock_limit_saturates() {
        let mut b = ConditionBuckets::new();
        let start = Duration::MAX - ms(150);
        b.arm(UNIT, ArmingCondition::timer(ms(100)), start).unwrap();
        let fired = b.fire_timers(Duration::MAX - ms(50));
        assert_eq!(fired.len(), 1);
        // The rearmed expiry clamps to the end of the clock's range.
        assert!(b.fire_timers(Duration::MAX - ms(1)).is_empty());
        assert_eq!(b.fire_timers(Duration::MAX).len(), 1);
    }

    #[test]
    fn late_timer_fires_once_and_restarts() {
        let mut b = ConditionBuckets::new();
        b.arm(UNIT, ArmingCondition::timer(ms(100)), ms(0)).unwrap();
        let fired = b.fire_timers(ms(350));
        assert_eq!(fired.len(), 1);
        match &fired[0].1 {
            Trigger::TimerExpired { elapsed, .. } => assert_eq!(*elapsed, ms(350)),
            other => panic!("unexpected trigger {other:?}"),
        }
        assert!(b.fire_timers(ms(449)).is_empty());
        assert_eq!(b.fire_timers(ms(450)).len(), 1);
    }

    #[test]
    fn post_event_matches_only_subscribers() {
        let mut b = ConditionBuckets::new();
        let a = b
            .arm(UNIT, ArmingCondition::post_event([EventId(1), EventId(2)]), ms(0))
            .unwrap();
        b.arm(OTHER, ArmingCondition::post_event([EventId(3)]), ms(0))
            .unwrap();
        let fired = b.distribute(EventId(2));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, UNIT);
        assert_eq!(fired[0].1.condition(), a);
        assert!(b.distribute(EventId(9)).is_empty());
    }

    #[test]
    fn input_fires_only_with_buffered_events() {
        let source = Arc::new(QueueSource::default());
        let mut b = ConditionBuckets::new();
        b.arm(UNIT, ArmingCondition::input(source.clone()), ms(0))
            .unwrap();
        assert!(b.poll_inputs().is_empty());
        source.0.lock().push(InputEvent::Custom { code: 7 });
        let fired = b.poll_inputs();
        assert_eq!(fired.len(), 1);
        match &fired[0].1 {
            Trigger::Input { events, .. } => assert_eq!(events.len(), 1),
            other => panic!("unexpected trigger {other:?}"),
        }
        assert!(b.poll_inputs().is_empty());
    }

    #[test]
    fn disarm_removes_all_leaves_and_is_idempotent() {
        let source = Arc::new(QueueSource::default());
        let mut b = ConditionBuckets::new();
        let id = b
            .arm(
                UNIT,
                ArmingCondition::any_of([
                    ArmingCondition::NewFrame,
                    ArmingCondition::timer(ms(10)),
                    ArmingCondition::post_event([EventId(4)]),
                    ArmingCondition::input(source),
                ]),
                ms(0),
            )
            .unwrap();
        assert_eq!(
            b.sizes(),
            BucketSizes {
                conditions: 1,
                new_frame: 1,
                timers: 1,
                post_events: 1,
                inputs: 1,
            }
        );
        assert_eq!(b.disarm(id), Some(UNIT));
        assert_eq!(b.sizes(), BucketSizes::default());
        assert_eq!(b.disarm(id), None);
    }

    #[test]
    fn shared_event_survives_partial_disarm() {
        let mut b = ConditionBuckets::new();
        let a = b
            .arm(UNIT, ArmingCondition::post_event([EventId(1)]), ms(0))
            .unwrap();
        b.arm(OTHER, ArmingCondition::post_event([EventId(1)]), ms(0))
            .unwrap();
        b.disarm(a);
        let fired = b.distribute(EventId(1));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, OTHER);
    }

    #[test]
    fn invalid_condition_rejected() {
        let mut b = ConditionBuckets::new();
        assert_eq!(
            b.arm(UNIT, ArmingCondition::timer(Duration::ZERO), ms(0)),
            Err(ConditionError::ZeroTimerPeriod {
                period: Duration::ZERO
            })
        );
        assert_eq!(b.sizes(), BucketSizes::default());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn timer_never_refires_within_period(
            period_ms in 1u64..200,
            steps in prop::collection::vec(1u64..120, 1..60),
        ) {
            let period = ms(period_ms);
            let mut b = ConditionBuckets::new();
            b.arm(UNIT, ArmingCondition::timer(period), Duration::ZERO).unwrap();
            let mut now = Duration::ZERO;
            let mut last_fire = Duration::ZERO;
            for step in steps {
                now += ms(step);
                let fired = b.fire_timers(now);
                prop_assert!(fired.len() <= 1);
                if fired.len() == 1 {
                    prop_assert!(now - last_fire >= period);
                    last_fire = now;
                } else {
                    prop_assert!(now - last_fire < period);
                }
            }
        }
    }
}
