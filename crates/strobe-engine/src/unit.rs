//! Registered unit state shared between the scheduler, workers, and the
//! render thread.
//!
//! A [`UnitSlot`] is created at registration and shared by `Arc`: the
//! registry holds one reference, and every in-flight activation holds
//! another. Flags and the lifecycle phase are atomics. The pending trigger
//! collection has its own lock, independent of the scheduler lock, so
//! stimuli can fire for a unit while a prior activation is computing.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use parking_lot::Mutex;
use strobe_core::{ArmingCollection, Phase, Processor, Trigger, UnitFlags, UnitId};

/// Per-activation lifecycle of a unit.
///
/// `Idle → Triggered → Queued → Computing → AwaitingCommit → Committing →
/// Idle`. A unit that was triggered again while in flight goes from
/// `Committing` straight back to `Triggered`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UnitPhase {
    /// No activation pending.
    Idle = 0,
    /// A condition fired; waiting for the next frame dispatch.
    Triggered = 1,
    /// Dispatched; waiting for a worker (or the render thread).
    Queued = 2,
    /// `compute()` is running.
    Computing = 3,
    /// `compute()` returned; waiting for the commit phase.
    AwaitingCommit = 4,
    /// `commit()` is running on the render thread.
    Committing = 5,
}

impl UnitPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Triggered,
            2 => Self::Queued,
            3 => Self::Computing,
            4 => Self::AwaitingCommit,
            5 => Self::Committing,
            _ => Self::Idle,
        }
    }
}

pub(crate) struct UnitSlot {
    id: UnitId,
    name: String,
    enabled: AtomicBool,
    swing_safe: AtomicBool,
    run_in_renderer: AtomicBool,
    phase: AtomicU8,
    processor: Mutex<Box<dyn Processor>>,
    pending: Mutex<ArmingCollection>,
}

// Compile-time assertion: UnitSlot must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<UnitSlot>();
};

impl UnitSlot {
    pub fn new(id: UnitId, flags: UnitFlags, processor: Box<dyn Processor>) -> Self {
        let name = processor.name().to_owned();
        Self {
            id,
            name,
            enabled: AtomicBool::new(flags.enabled),
            swing_safe: AtomicBool::new(flags.swing_safe),
            run_in_renderer: AtomicBool::new(flags.run_in_renderer),
            phase: AtomicU8::new(UnitPhase::Idle as u8),
            processor: Mutex::new(processor),
            pending: Mutex::new(ArmingCollection::new()),
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> UnitFlags {
        UnitFlags {
            enabled: self.enabled.load(Ordering::Acquire),
            swing_safe: self.swing_safe.load(Ordering::Acquire),
            run_in_renderer: self.run_in_renderer.load(Ordering::Acquire),
        }
    }

    pub fn set_flags(&self, flags: UnitFlags) {
        self.enabled.store(flags.enabled, Ordering::Release);
        self.swing_safe.store(flags.swing_safe, Ordering::Release);
        self.run_in_renderer
            .store(flags.run_in_renderer, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn is_swing_safe(&self) -> bool {
        self.swing_safe.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> UnitPhase {
        UnitPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn set_phase(&self, phase: UnitPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Record a fired condition into the pending collection.
    pub fn record(&self, trigger: Trigger) {
        let mut pending = self.pending.lock();
        pending.push(trigger);
        if self.phase() == UnitPhase::Idle {
            self.set_phase(UnitPhase::Triggered);
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Move the pending triggers into a new activation.
    pub fn take_for_dispatch(&self) -> ArmingCollection {
        let mut pending = self.pending.lock();
        self.set_phase(UnitPhase::Queued);
        pending.take()
    }

    /// Drop pending triggers without running the unit.
    pub fn discard_pending(&self) {
        let mut pending = self.pending.lock();
        pending.clear();
        if self.phase() == UnitPhase::Triggered {
            self.set_phase(UnitPhase::Idle);
        }
    }

    /// End an activation after its commit.
    pub fn finish_activation(&self) {
        let pending = self.pending.lock();
        let next = if pending.is_empty() {
            UnitPhase::Idle
        } else {
            UnitPhase::Triggered
        };
        self.set_phase(next);
    }

    /// Run one phase of the processor, isolating errors and panics.
    ///
    /// Returns `false` if the phase failed. Failures are logged here with
    /// the unit identity and never propagate.
    pub fn run_phase(&self, phase: Phase, arming: &ArmingCollection) -> bool {
        let mut processor = self.processor.lock();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match phase {
            Phase::Compute => processor.compute(arming),
            Phase::Commit => processor.commit(arming),
        }));
        match outcome {
            Ok(Ok(())) => {
                tracing::trace!(unit = %self.id, name = %self.name, ?phase, "phase complete");
                true
            }
            Ok(Err(err)) => {
                tracing::error!(
                    unit = %self.id,
                    name = %self.name,
                    ?phase,
                    error = %err,
                    "unit phase failed"
                );
                false
            }
            Err(payload) => {
                tracing::error!(
                    unit = %self.id,
                    name = %self.name,
                    ?phase,
                    panic = %panic_message(payload.as_ref()),
                    "unit phase panicked"
                );
                false
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strobe_core::{ArmingCondition, ConditionId, FrameId, ProcessorError};

    struct Scripted {
        fail_compute: bool,
        panic_commit: bool,
        commits: u32,
    }

    impl Processor for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn initialize(&mut self) -> Option<ArmingCondition> {
            None
        }

        fn compute(&mut self, _arming: &ArmingCollection) -> Result<(), ProcessorError> {
            if self.fail_compute {
                Err(ProcessorError::failed("compute refused"))
            } else {
                Ok(())
            }
        }

        fn commit(&mut self, _arming: &ArmingCollection) -> Result<(), ProcessorError> {
            if self.panic_commit {
                panic!("commit exploded");
            }
            self.commits += 1;
            Ok(())
        }
    }

    fn slot(fail_compute: bool, panic_commit: bool) -> UnitSlot {
        UnitSlot::new(
            UnitId::new(0, 0),
            UnitFlags::default(),
            Box::new(Scripted {
                fail_compute,
                panic_commit,
                commits: 0,
            }),
        )
    }

    fn new_frame_trigger() -> Trigger {
        Trigger::NewFrame {
            condition: ConditionId(1),
            frame: FrameId(1),
        }
    }

    #[test]
    fn lifecycle_phases() {
        let s = slot(false, false);
        assert_eq!(s.phase(), UnitPhase::Idle);
        s.record(new_frame_trigger());
        assert_eq!(s.phase(), UnitPhase::Triggered);
        let arming = s.take_for_dispatch();
        assert_eq!(arming.len(), 1);
        assert_eq!(s.phase(), UnitPhase::Queued);
        assert!(!s.has_pending());
        s.finish_activation();
        assert_eq!(s.phase(), UnitPhase::Idle);
    }

    #[test]
    fn trigger_during_flight_returns_to_triggered() {
        let s = slot(false, false);
        s.record(new_frame_trigger());
        let _arming = s.take_for_dispatch();
        s.set_phase(UnitPhase::Computing);
        s.record(new_frame_trigger());
        // A trigger while in flight does not change the in-flight phase.
        assert_eq!(s.phase(), UnitPhase::Computing);
        s.finish_activation();
        assert_eq!(s.phase(), UnitPhase::Triggered);
    }

    #[test]
    fn discard_pending_returns_to_idle() {
        let s = slot(false, false);
        s.record(new_frame_trigger());
        s.discard_pending();
        assert!(!s.has_pending());
        assert_eq!(s.phase(), UnitPhase::Idle);
    }

    #[test]
    fn compute_error_is_isolated() {
        let s = slot(true, false);
        assert!(!s.run_phase(Phase::Compute, &ArmingCollection::new()));
        assert!(s.run_phase(Phase::Commit, &ArmingCollection::new()));
    }

    #[test]
    fn commit_panic_is_isolated() {
        let s = slot(false, true);
        assert!(!s.run_phase(Phase::Commit, &ArmingCollection::new()));
        // The processor lock is not poisoned: the unit can run again.
        assert!(s.run_phase(Phase::Compute, &ArmingCollection::new()));
    }

    #[test]
    fn flags_round_trip() {
        let s = slot(false, false);
        assert_eq!(s.flags(), UnitFlags::default());
        s.set_flags(UnitFlags {
            enabled: false,
            swing_safe: true,
            run_in_renderer: true,
        });
        assert!(!s.is_enabled());
        assert!(s.is_swing_safe());
        assert!(s.flags().run_in_renderer);
    }
}
