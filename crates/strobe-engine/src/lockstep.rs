//! Lockstep (caller-driven) frame loop.
//!
//! [`LockstepEngine`] runs one whole frame per
//! [`step_frame()`](LockstepEngine::step_frame) on the calling thread: tick
//! and dispatch, wait for every chain to compute, then commit. The caller
//! plays the render thread. Useful for tests, tools, and hosts that own
//! their own loop.
//!
//! # Shutdown
//!
//! Dropping a `LockstepEngine` shuts down the scheduler and joins its
//! workers.

use std::sync::Arc;
use std::time::Instant;

use strobe_core::{ExternalLock, NoExternalLock};

use crate::clock::{Clock, SystemClock};
use crate::commit::CommitSequencer;
use crate::config::{ConfigError, EngineConfig};
use crate::metrics::FrameMetrics;
use crate::scheduler::{Scheduler, SchedulerHandle};

// Compile-time assertion: LockstepEngine is Send.
const _: () = {
    #[allow(dead_code)]
    fn assert_send<T: Send>() {}
    #[allow(dead_code)]
    fn check() {
        assert_send::<LockstepEngine>();
    }
};

/// Synchronous, caller-driven frame engine.
pub struct LockstepEngine {
    scheduler: Scheduler,
    sequencer: CommitSequencer,
    config: EngineConfig,
}

impl LockstepEngine {
    /// Start an engine on the system clock with no external lock.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_parts(config, Arc::new(SystemClock::new()), Arc::new(NoExternalLock))
    }

    /// Start an engine with an explicit clock and external lock.
    pub fn with_parts(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        lock: Arc<dyn ExternalLock>,
    ) -> Result<Self, ConfigError> {
        let scheduler = Scheduler::with_clock(&config, clock)?;
        let sequencer = CommitSequencer::new(&scheduler, lock, config.commit_budget());
        Ok(Self {
            scheduler,
            sequencer,
            config,
        })
    }

    /// The scheduler, for registering units and arming conditions.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// A cloneable scheduler handle.
    pub fn handle(&self) -> SchedulerHandle {
        self.scheduler.handle()
    }

    /// The configuration this engine was started with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one frame: dispatch, compute, commit.
    ///
    /// Blocks until every dispatched chain has computed. Unit failures are
    /// logged and counted in the returned metrics.
    pub fn step_frame(&mut self) -> FrameMetrics {
        let start = Instant::now();
        let dispatch = self.scheduler.trigger_new_frame();
        let mut metrics = FrameMetrics::from_dispatch(&dispatch);
        if let Some(batch) = self.scheduler.wait_for_batch(None) {
            metrics.record_batch(&batch);
            let report = self.sequencer.run_commit_list(batch);
            metrics.record_commit(&report);
        }
        metrics.total_us = start.elapsed().as_micros() as u64;
        metrics
    }

    /// Shut down the scheduler. Returns the number of workers joined.
    pub fn shutdown(&mut self) -> usize {
        self.scheduler.shutdown()
    }
}
