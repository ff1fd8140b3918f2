//! Per-frame metrics for the scheduling core.
//!
//! [`FrameMetrics`] summarises one frame's dispatch, compute, and commit
//! phases. The lockstep engine returns one per step; the realtime engine
//! publishes the most recent one.

use strobe_core::FrameId;

use crate::commit::{CommitBatch, CommitReport};
use crate::scheduler::FrameDispatch;

/// Timing and counts for one frame.
///
/// All durations are in microseconds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameMetrics {
    /// The frame these metrics describe.
    pub frame: FrameId,
    /// Conditions that fired at the frame tick.
    pub fired: usize,
    /// Chains dispatched.
    pub chains: usize,
    /// Chains handed directly to an idle worker.
    pub to_workers: usize,
    /// Chains that waited in the backlog for a worker.
    pub queued: usize,
    /// Chains computed on the render thread.
    pub in_renderer: usize,
    /// Triggered units skipped because they were disabled.
    pub skipped_disabled: usize,
    /// Whether dispatch was deferred to a later tick.
    pub deferred: bool,
    /// Units whose `compute()` failed.
    pub compute_failures: u32,
    /// Units whose `commit()` failed.
    pub commit_failures: u32,
    /// Units committed.
    pub units_committed: usize,
    /// Dispatch to last compute finishing, in microseconds.
    pub parallel_us: u64,
    /// Commit phase, in microseconds.
    pub commit_us: u64,
    /// Whether the commit phase ran past its budget.
    pub over_budget: bool,
    /// Whole frame, in microseconds.
    pub total_us: u64,
}

impl FrameMetrics {
    /// Metrics seeded from a frame's dispatch report.
    pub fn from_dispatch(dispatch: &FrameDispatch) -> Self {
        Self {
            frame: dispatch.frame,
            fired: dispatch.fired,
            chains: dispatch.chains,
            to_workers: dispatch.to_workers,
            queued: dispatch.queued,
            in_renderer: dispatch.in_renderer,
            skipped_disabled: dispatch.skipped_disabled,
            deferred: dispatch.deferred,
            ..Self::default()
        }
    }

    pub(crate) fn record_batch(&mut self, batch: &CommitBatch) {
        self.compute_failures = batch.compute_failures();
        self.parallel_us = batch.parallel_elapsed().as_micros() as u64;
    }

    pub(crate) fn record_commit(&mut self, report: &CommitReport) {
        self.commit_failures = report.commit_failures;
        self.units_committed = report.units_committed;
        self.commit_us = report.elapsed.as_micros() as u64;
        self.over_budget = report.over_budget;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn default_metrics_are_zero() {
        let m = FrameMetrics::default();
        assert_eq!(m.frame, FrameId(0));
        assert_eq!(m.chains, 0);
        assert_eq!(m.total_us, 0);
        assert!(!m.over_budget);
    }

    #[test]
    fn seeded_from_dispatch_and_commit() {
        let dispatch = FrameDispatch {
            frame: FrameId(4),
            fired: 3,
            chains: 2,
            to_workers: 1,
            queued: 1,
            ..FrameDispatch::default()
        };
        let mut m = FrameMetrics::from_dispatch(&dispatch);
        m.record_commit(&CommitReport {
            frame: FrameId(4),
            chains: 2,
            units_committed: 3,
            commit_failures: 1,
            elapsed: Duration::from_micros(250),
            over_budget: true,
        });
        assert_eq!(m.frame, FrameId(4));
        assert_eq!(m.queued, 1);
        assert_eq!(m.units_committed, 3);
        assert_eq!(m.commit_failures, 1);
        assert_eq!(m.commit_us, 250);
        assert!(m.over_budget);
    }
}
