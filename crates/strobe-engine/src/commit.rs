//! Render-thread commit phase.
//!
//! A [`CommitBatch`] holds every chain computed for one frame, in dispatch
//! order. [`CommitSequencer::run_commit_list`] runs `commit()` for each
//! unit of each chain strictly in that order on the calling thread, which
//! must be the render thread.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use strobe_core::{ExternalLock, FrameId, Phase, UnitId};

use crate::chain::ChainTask;
use crate::scheduler::SchedulerHandle;
use crate::unit::UnitPhase;

// ── CommitBatch ────────────────────────────────────────────────────

/// The computed chains of one frame, ready for the commit phase.
pub struct CommitBatch {
    frame: FrameId,
    chains: Vec<ChainTask>,
    parallel_elapsed: Duration,
}

impl CommitBatch {
    pub(crate) fn new(frame: FrameId, chains: Vec<ChainTask>, parallel_elapsed: Duration) -> Self {
        Self {
            frame,
            chains,
            parallel_elapsed,
        }
    }

    /// Frame this batch was dispatched for.
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Number of chains.
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Whether no chain was dispatched this frame.
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Every unit in commit order.
    pub fn units(&self) -> Vec<UnitId> {
        self.chains
            .iter()
            .flat_map(|c| c.links.iter().map(|l| l.unit.id()))
            .collect()
    }

    /// Head unit of each chain, in commit order.
    pub fn heads(&self) -> Vec<UnitId> {
        self.chains.iter().filter_map(ChainTask::head).collect()
    }

    /// Units whose `compute()` failed or panicked.
    pub fn compute_failures(&self) -> u32 {
        self.chains.iter().map(|c| c.compute_failures).sum()
    }

    /// Time from dispatch until the last chain finished computing.
    pub fn parallel_elapsed(&self) -> Duration {
        self.parallel_elapsed
    }
}

impl std::fmt::Debug for CommitBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitBatch")
            .field("frame", &self.frame)
            .field("units", &self.units())
            .field("parallel_elapsed", &self.parallel_elapsed)
            .finish()
    }
}

// ── CommitSignal ───────────────────────────────────────────────────

/// Last committed frame, with a condvar for waiters.
#[derive(Default)]
pub(crate) struct CommitSignal {
    last: Mutex<FrameId>,
    cond: Condvar,
}

impl CommitSignal {
    pub fn mark(&self, frame: FrameId) {
        let mut last = self.last.lock();
        if frame > *last {
            *last = frame;
        }
        self.cond.notify_all();
    }

    pub fn last(&self) -> FrameId {
        *self.last.lock()
    }

    pub fn wake_all(&self) {
        let _guard = self.last.lock();
        self.cond.notify_all();
    }

    /// Block until `frame` has committed or `timeout` elapses.
    pub fn wait_for(&self, frame: FrameId, timeout: Duration, stop: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut last = self.last.lock();
        while *last < frame {
            if stop() || self.cond.wait_until(&mut last, deadline).timed_out() {
                return *last >= frame;
            }
        }
        true
    }
}

// ── CommitReport ───────────────────────────────────────────────────

/// Outcome of one commit phase.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommitReport {
    /// Frame that was committed.
    pub frame: FrameId,
    /// Chains committed.
    pub chains: usize,
    /// Units whose `commit()` ran.
    pub units_committed: usize,
    /// Units whose `commit()` failed or panicked.
    pub commit_failures: u32,
    /// Wall time of the whole commit phase.
    pub elapsed: Duration,
    /// Whether the phase ran past its budget. The batch is completed
    /// regardless.
    pub over_budget: bool,
}

// ── CommitSequencer ────────────────────────────────────────────────

/// Releases the external lock for its lifetime, reacquiring on drop.
struct ReleasedLock<'a> {
    lock: &'a dyn ExternalLock,
}

impl<'a> ReleasedLock<'a> {
    fn new(lock: &'a dyn ExternalLock) -> Self {
        lock.release();
        Self { lock }
    }
}

impl Drop for ReleasedLock<'_> {
    fn drop(&mut self) {
        self.lock.reacquire();
    }
}

/// Runs the commit phase of each frame on the render thread.
pub struct CommitSequencer {
    lock: Arc<dyn ExternalLock>,
    budget: Duration,
    signal: Arc<CommitSignal>,
}

impl CommitSequencer {
    /// A sequencer reporting commits to `scheduler`'s waiters, releasing
    /// `lock` around swing-safe units, with an advisory `budget`.
    pub fn new(scheduler: &SchedulerHandle, lock: Arc<dyn ExternalLock>, budget: Duration) -> Self {
        Self {
            lock,
            budget,
            signal: scheduler.commit_signal(),
        }
    }

    /// Advisory per-frame commit budget.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Commit every unit of `batch` in chain order, then mark the frame
    /// committed.
    ///
    /// A unit's failure is logged and does not stop the batch. Each unit's
    /// arming collection is dropped right after its commit, and the unit
    /// returns to `Idle` (or `Triggered`, if it fired again meanwhile).
    pub fn run_commit_list(&self, batch: CommitBatch) -> CommitReport {
        let start = Instant::now();
        let mut report = CommitReport {
            frame: batch.frame,
            chains: batch.chains.len(),
            ..CommitReport::default()
        };

        for chain in batch.chains {
            let mut previous: Option<UnitId> = None;
            let mut links = chain.links.into_iter();
            while let Some(link) = links.next() {
                let unit = link.unit;
                if previous == Some(unit.id()) {
                    tracing::warn!(
                        unit = %unit.id(),
                        name = %unit.name(),
                        "unit is its own chain successor; commit chain truncated"
                    );
                    unit.finish_activation();
                    for rest in links.by_ref() {
                        rest.unit.finish_activation();
                    }
                    break;
                }
                unit.set_phase(UnitPhase::Committing);
                let ok = if unit.is_swing_safe() && self.lock.is_held() {
                    let _released = ReleasedLock::new(self.lock.as_ref());
                    unit.run_phase(Phase::Commit, &link.arming)
                } else {
                    unit.run_phase(Phase::Commit, &link.arming)
                };
                if !ok {
                    report.commit_failures += 1;
                }
                drop(link.arming);
                unit.finish_activation();
                report.units_committed += 1;
                previous = Some(unit.id());
            }

            if !report.over_budget && start.elapsed() > self.budget {
                report.over_budget = true;
                tracing::debug!(
                    frame = %batch.frame,
                    elapsed = ?start.elapsed(),
                    budget = ?self.budget,
                    "commit phase over budget; completing batch"
                );
            }
        }

        report.elapsed = start.elapsed();
        self.signal.mark(batch.frame);
        tracing::trace!(frame = %batch.frame, units = report.units_committed, "frame committed");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use smallvec::smallvec;
    use strobe_core::{
        ArmingCollection, ArmingCondition, NoExternalLock, Processor, ProcessorError, UnitFlags,
    };

    use crate::chain::ChainLink;
    use crate::config::EngineConfig;
    use crate::scheduler::Scheduler;
    use crate::unit::UnitSlot;

    struct CountsCommits(Arc<AtomicUsize>);

    impl Processor for CountsCommits {
        fn name(&self) -> &str {
            "counts"
        }
        fn initialize(&mut self) -> Option<ArmingCondition> {
            None
        }
        fn compute(&mut self, _: &ArmingCollection) -> Result<(), ProcessorError> {
            Ok(())
        }
        fn commit(&mut self, _: &ArmingCollection) -> Result<(), ProcessorError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn awaiting_slot(index: u32, commits: &Arc<AtomicUsize>) -> Arc<UnitSlot> {
        let slot = Arc::new(UnitSlot::new(
            UnitId::new(index, 0),
            UnitFlags::default(),
            Box::new(CountsCommits(Arc::clone(commits))),
        ));
        slot.set_phase(UnitPhase::AwaitingCommit);
        slot
    }

    fn link(unit: &Arc<UnitSlot>) -> ChainLink {
        ChainLink {
            unit: Arc::clone(unit),
            arming: ArmingCollection::new(),
        }
    }

    #[test]
    fn self_successor_commits_once_and_releases_rest() {
        let scheduler = Scheduler::new(&EngineConfig::with_workers(1)).unwrap();
        let sequencer =
            CommitSequencer::new(&scheduler, Arc::new(NoExternalLock), Duration::from_secs(1));
        let looped = Arc::new(AtomicUsize::new(0));
        let trailing = Arc::new(AtomicUsize::new(0));
        let a = awaiting_slot(0, &looped);
        let b = awaiting_slot(1, &trailing);

        let task = ChainTask::new(0, FrameId(1), smallvec![link(&a), link(&a), link(&b)]);
        let report = sequencer.run_commit_list(CommitBatch::new(
            FrameId(1),
            vec![task],
            Duration::ZERO,
        ));

        assert_eq!(looped.load(Ordering::SeqCst), 1);
        assert_eq!(trailing.load(Ordering::SeqCst), 0);
        assert_eq!(report.units_committed, 1);
        assert_eq!(report.commit_failures, 0);
        assert_eq!(a.phase(), UnitPhase::Idle);
        assert_eq!(b.phase(), UnitPhase::Idle);
        assert_eq!(scheduler.last_committed(), FrameId(1));
    }

    #[test]
    fn signal_wait_returns_when_marked() {
        let signal = Arc::new(CommitSignal::default());
        let marker = Arc::clone(&signal);
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            marker.mark(FrameId(3));
        });
        assert!(signal.wait_for(FrameId(3), Duration::from_secs(5), || false));
        t.join().unwrap();
        assert_eq!(signal.last(), FrameId(3));
    }

    #[test]
    fn signal_wait_times_out() {
        let signal = CommitSignal::default();
        signal.mark(FrameId(1));
        assert!(!signal.wait_for(FrameId(2), Duration::from_millis(20), || false));
        assert!(signal.wait_for(FrameId(1), Duration::from_millis(1), || false));
    }

    #[test]
    fn signal_never_moves_backwards() {
        let signal = CommitSignal::default();
        signal.mark(FrameId(5));
        signal.mark(FrameId(4));
        assert_eq!(signal.last(), FrameId(5));
    }
}
