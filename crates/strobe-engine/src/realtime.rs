//! User-facing [`RealtimeEngine`] and shutdown state machine.
//!
//! The render loop runs on a dedicated thread at the configured frame
//! rate while the scheduler's worker pool computes triggered chains.
//!
//! # Architecture
//!
//! ```text
//! App Thread(s)              Render Thread                Workers (N)
//!     |                           |                            |
//!     |--register()/arm()-------->| (scheduler lock)           |
//!     |--distribute_post_event()->|                            |
//!     |                           | target.render(frame)       |
//!     |                           | wait_for_batch()  <--------| notify_done()
//!     |                           | run_commit_list(batch)     |
//!     |                           | trigger_new_frame() ------>| compute chains
//!     |                           | park(period - elapsed)     |
//!     |<--wait_committed()--------|                            |
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use strobe_core::{ExternalLock, FrameId, RenderTarget};

use crate::clock::{Clock, SystemClock};
use crate::commit::CommitSequencer;
use crate::config::{ConfigError, EngineConfig};
use crate::metrics::FrameMetrics;
use crate::render_thread::{RenderTelemetry, RenderThreadState};
use crate::scheduler::{Scheduler, SchedulerHandle};

// ── ShutdownReport ─────────────────────────────────────────────────

/// Report from the shutdown state machine.
#[derive(Debug)]
pub struct ShutdownReport {
    /// Total time spent in the shutdown sequence.
    pub total_ms: u64,
    /// Time spent waiting for the render thread to stop.
    pub drain_ms: u64,
    /// Whether the render thread was joined successfully.
    pub render_joined: bool,
    /// Number of worker threads joined.
    pub workers_joined: usize,
    /// Frames committed over the engine's lifetime.
    pub frames_committed: u64,
}

// ── RealtimeStats ──────────────────────────────────────────────────

/// Cumulative counters from the render thread.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RealtimeStats {
    /// Frames committed.
    pub frames_committed: u64,
    /// Ticks whose dispatch was deferred behind an uncommitted batch.
    pub deferred_frames: u64,
    /// Frames whose commit phase ran past budget.
    pub over_budget_frames: u64,
    /// Unit `compute()` failures.
    pub compute_failures: u64,
    /// Unit `commit()` failures.
    pub commit_failures: u64,
    /// Metrics of the most recently committed frame.
    pub last: FrameMetrics,
}

// ── ShutdownState ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownState {
    Running,
    Draining,
    Dropped,
}

// ── RealtimeEngine ─────────────────────────────────────────────────

/// Frame engine driven by its own render thread.
pub struct RealtimeEngine {
    scheduler: Scheduler,
    shutdown_flag: Arc<AtomicBool>,
    render_stopped: Arc<AtomicBool>,
    render_thread: Option<JoinHandle<Box<dyn RenderTarget>>>,
    telemetry: Arc<RenderTelemetry>,
    state: ShutdownState,
    /// Recovered from the render thread on shutdown.
    recovered_target: Option<Box<dyn RenderTarget>>,
}

impl RealtimeEngine {
    /// Start the worker pool and the render thread on the system clock.
    ///
    /// `lock` is the external UI lock the render thread may hold; it is
    /// released around the commit of swing-safe units.
    pub fn new(
        config: EngineConfig,
        target: Box<dyn RenderTarget>,
        lock: Arc<dyn ExternalLock>,
    ) -> Result<Self, ConfigError> {
        Self::with_clock(config, target, lock, Arc::new(SystemClock::new()))
    }

    /// Start with an explicit clock for timer conditions.
    pub fn with_clock(
        config: EngineConfig,
        target: Box<dyn RenderTarget>,
        lock: Arc<dyn ExternalLock>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let scheduler = Scheduler::with_clock(&config, clock)?;
        let sequencer = CommitSequencer::new(&scheduler, lock, config.commit_budget());
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let render_stopped = Arc::new(AtomicBool::new(false));
        let telemetry = Arc::new(RenderTelemetry::default());

        let state = RenderThreadState::new(
            scheduler.handle(),
            sequencer,
            target,
            config.frame_period(),
            Arc::clone(&shutdown_flag),
            Arc::clone(&render_stopped),
            Arc::clone(&telemetry),
        );
        let render_thread = thread::Builder::new()
            .name("strobe-render".into())
            .spawn(move || state.run())
            .map_err(|e| ConfigError::ThreadSpawnFailed {
                reason: format!("render thread: {e}"),
            })?;

        tracing::info!(
            frame_rate_hz = config.target_frame_rate_hz,
            workers = scheduler.worker_count(),
            "realtime engine started"
        );
        Ok(Self {
            scheduler,
            shutdown_flag,
            render_stopped,
            render_thread: Some(render_thread),
            telemetry,
            state: ShutdownState::Running,
            recovered_target: None,
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

    /// Most recently committed frame.
    pub fn last_committed(&self) -> FrameId {
        self.scheduler.last_committed()
    }

    /// Block until `frame` has been committed. Returns `false` on timeout
    /// or shutdown.
    pub fn wait_committed(&self, frame: FrameId, timeout: Duration) -> bool {
        self.scheduler.wait_committed(frame, timeout)
    }

    /// Snapshot of the render thread's counters.
    pub fn stats(&self) -> RealtimeStats {
        let t = &self.telemetry;
        RealtimeStats {
            frames_committed: t.frames_committed.load(Ordering::Relaxed),
            deferred_frames: t.deferred_frames.load(Ordering::Relaxed),
            over_budget_frames: t.over_budget_frames.load(Ordering::Relaxed),
            compute_failures: t.compute_failures.load(Ordering::Relaxed),
            commit_failures: t.commit_failures.load(Ordering::Relaxed),
            last: t.last.lock().clone(),
        }
    }

    /// Whether the render thread is still running.
    pub fn is_running(&self) -> bool {
        self.state == ShutdownState::Running && !self.render_stopped.load(Ordering::Acquire)
    }

    /// Take back the render target after shutdown.
    pub fn take_render_target(&mut self) -> Option<Box<dyn RenderTarget>> {
        self.recovered_target.take()
    }

    /// Shut the engine down.
    ///
    /// 1. **Running → Draining:** set the shutdown flag, unpark the render
    ///    thread, and join it. A commit in progress completes first.
    /// 2. **Draining → Dropped:** shut the scheduler down, joining workers
    ///    after their current chain.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.state == ShutdownState::Dropped {
            return ShutdownReport {
                total_ms: 0,
                drain_ms: 0,
                render_joined: true,
                workers_joined: 0,
                frames_committed: self.telemetry.frames_committed.load(Ordering::Relaxed),
            };
        }

        let start = Instant::now();

        // Phase 1: Running → Draining
        self.state = ShutdownState::Draining;
        self.shutdown_flag.store(true, Ordering::Release);
        if let Some(handle) = &self.render_thread {
            handle.thread().unpark();
        }
        let render_joined = match self.render_thread.take() {
            Some(handle) => match handle.join() {
                Ok(target) => {
                    self.recovered_target = Some(target);
                    true
                }
                Err(_) => false,
            },
            None => true,
        };
        let drain_ms = start.elapsed().as_millis() as u64;

        // Phase 2: Draining → Dropped
        self.state = ShutdownState::Dropped;
        let workers_joined = self.scheduler.shutdown();

        let report = ShutdownReport {
            total_ms: start.elapsed().as_millis() as u64,
            drain_ms,
            render_joined,
            workers_joined,
            frames_committed: self.telemetry.frames_committed.load(Ordering::Relaxed),
        };
        tracing::info!(?report, "realtime engine shut down");
        report
    }
}

impl Drop for RealtimeEngine {
    fn drop(&mut self) {
        if self.state != ShutdownState::Dropped {
            self.shutdown();
        }
    }
}
