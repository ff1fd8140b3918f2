//! Render loop for [`RealtimeEngine`](crate::RealtimeEngine).
//!
//! Each iteration renders, commits the batch dispatched by the previous
//! iteration, starts the next frame, then parks for what is left of the
//! frame period. Compute for frame N therefore overlaps the render of
//! frame N, and frame N commits before frame N+1 is dispatched.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use strobe_core::{FrameId, RenderTarget};

use crate::clock::FramePacer;
use crate::commit::CommitSequencer;
use crate::metrics::FrameMetrics;
use crate::scheduler::{FrameDispatch, SchedulerHandle};

/// How long one wait for a batch blocks before rechecking the shutdown
/// flag.
const BATCH_POLL: Duration = Duration::from_millis(10);

/// Counters published by the render thread.
#[derive(Default)]
pub(crate) struct RenderTelemetry {
    pub last: Mutex<FrameMetrics>,
    pub frames_committed: AtomicU64,
    pub deferred_frames: AtomicU64,
    pub over_budget_frames: AtomicU64,
    pub compute_failures: AtomicU64,
    pub commit_failures: AtomicU64,
}

impl RenderTelemetry {
    fn publish(&self, metrics: FrameMetrics) {
        self.frames_committed.fetch_add(1, Ordering::Relaxed);
        if metrics.over_budget {
            self.over_budget_frames.fetch_add(1, Ordering::Relaxed);
        }
        self.compute_failures
            .fetch_add(u64::from(metrics.compute_failures), Ordering::Relaxed);
        self.commit_failures
            .fetch_add(u64::from(metrics.commit_failures), Ordering::Relaxed);
        *self.last.lock() = metrics;
    }
}

/// State held by the render thread's main loop.
pub(crate) struct RenderThreadState {
    scheduler: SchedulerHandle,
    sequencer: CommitSequencer,
    target: Box<dyn RenderTarget>,
    pacer: FramePacer,
    shutdown_flag: Arc<AtomicBool>,
    render_stopped: Arc<AtomicBool>,
    telemetry: Arc<RenderTelemetry>,
    /// The dispatch awaiting its commit, and when it started.
    in_flight: Option<(FrameDispatch, Instant)>,
}

impl RenderThreadState {
    pub fn new(
        scheduler: SchedulerHandle,
        sequencer: CommitSequencer,
        target: Box<dyn RenderTarget>,
        frame_period: Duration,
        shutdown_flag: Arc<AtomicBool>,
        render_stopped: Arc<AtomicBool>,
        telemetry: Arc<RenderTelemetry>,
    ) -> Self {
        Self {
            scheduler,
            sequencer,
            target,
            pacer: FramePacer::new(frame_period),
            shutdown_flag,
            render_stopped,
            telemetry,
            in_flight: None,
        }
    }

    fn stopping(&self) -> bool {
        self.shutdown_flag.load(Ordering::Acquire)
    }

    /// Main render loop. Runs until `shutdown_flag` is set.
    ///
    /// Consumes self and returns the render target to the caller.
    pub fn run(mut self) -> Box<dyn RenderTarget> {
        let mut rendered = FrameId::default();
        loop {
            if self.stopping() {
                break;
            }
            let frame_start = Instant::now();

            // 1. Render what the last commit produced.
            self.target.render(rendered);

            // 2. Commit the frame dispatched last iteration.
            if let Some(frame) = self.commit_pending() {
                rendered = frame;
            }
            if self.stopping() {
                break;
            }

            // 3. Start the next frame.
            let since_last = self.pacer.tick(Instant::now());
            let dispatch = self.scheduler.trigger_new_frame();
            tracing::trace!(frame = %dispatch.frame, ?since_last, "frame tick");
            if dispatch.deferred {
                self.telemetry.deferred_frames.fetch_add(1, Ordering::Relaxed);
            } else {
                self.in_flight = Some((dispatch, frame_start));
            }

            // 4. Park for the rest of the frame period.
            if let Some(remaining) = self.pacer.remaining(frame_start.elapsed()) {
                std::thread::park_timeout(remaining);
            }
        }

        self.render_stopped.store(true, Ordering::Release);
        tracing::debug!(frame = %rendered, "render thread stopped");
        self.target
    }

    /// Wait for the pending batch and commit it. Returns the committed
    /// frame.
    fn commit_pending(&mut self) -> Option<FrameId> {
        loop {
            if let Some(batch) = self.scheduler.wait_for_batch(Some(BATCH_POLL)) {
                let frame = batch.frame();
                let (dispatch, started) = match self.in_flight.take() {
                    Some((dispatch, started)) if dispatch.frame == frame => (dispatch, started),
                    _ => (
                        FrameDispatch {
                            frame,
                            ..FrameDispatch::default()
                        },
                        Instant::now(),
                    ),
                };
                let mut metrics = FrameMetrics::from_dispatch(&dispatch);
                metrics.record_batch(&batch);
                let report = self.sequencer.run_commit_list(batch);
                metrics.record_commit(&report);
                metrics.total_us = started.elapsed().as_micros() as u64;
                self.telemetry.publish(metrics);
                return Some(frame);
            }
            if !self.scheduler.batch_pending() || self.stopping() {
                return None;
            }
        }
    }
}
