//! Central scheduler: unit registration, condition arming, frame dispatch,
//! and hand-off of computed batches to the commit phase.
//!
//! All registry, bucket, and dispatch state sits behind one mutex. Each
//! unit's pending triggers have their own lock, so a unit can be
//! triggered again while a prior activation is still in flight.
//!
//! At most one frame's batch is in flight. A frame tick that arrives
//! while the previous batch is still computing, or has not yet been
//! committed, fires conditions as usual but defers dispatch; the triggers
//! accumulate and go out with the next tick.

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexSet;
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use strobe_core::{
    ArmingCondition, ConditionId, EventId, FrameId, OwnerId, Processor, UnitFlags, UnitId,
};

use crate::buckets::{BucketSizes, ConditionBuckets, Fired};
use crate::chain::{ChainLink, ChainTask};
use crate::clock::{Clock, SystemClock};
use crate::commit::{CommitBatch, CommitSignal};
use crate::config::{ConfigError, EngineConfig};
use crate::error::SchedulerError;
use crate::registry::UnitRegistry;
use crate::unit::{UnitPhase, UnitSlot};
use crate::worker::{WorkerMailbox, WorkerPool};

// ── FrameDispatch ──────────────────────────────────────────────────

/// What one frame tick fired and dispatched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameDispatch {
    /// The frame that was started.
    pub frame: FrameId,
    /// Conditions that fired this tick.
    pub fired: usize,
    /// Chains dispatched (0 if deferred).
    pub chains: usize,
    /// Chains handed directly to an idle worker.
    pub to_workers: usize,
    /// Chains placed in the FIFO backlog because no worker was idle.
    pub queued: usize,
    /// Chains computed inline on the calling thread.
    pub in_renderer: usize,
    /// Triggered units skipped because they were disabled.
    pub skipped_disabled: usize,
    /// Whether dispatch was deferred because the previous batch was still
    /// pending.
    pub deferred: bool,
}

// ── Shared state ───────────────────────────────────────────────────

struct InFlight {
    frame: FrameId,
    slots: Vec<Option<ChainTask>>,
    outstanding: usize,
    started: Instant,
}

struct SchedulerState {
    registry: UnitRegistry,
    buckets: ConditionBuckets,
    /// Chain roots with pending triggers, in first-trigger order.
    pending: IndexSet<UnitId>,
    frame: FrameId,
    workers: Vec<WorkerMailbox>,
    backlog: VecDeque<ChainTask>,
    in_flight: Option<InFlight>,
    ready: Option<CommitBatch>,
}

impl SchedulerState {
    fn new() -> Self {
        Self {
            registry: UnitRegistry::new(),
            buckets: ConditionBuckets::new(),
            pending: IndexSet::new(),
            frame: FrameId::default(),
            workers: Vec::new(),
            backlog: VecDeque::new(),
            in_flight: None,
            ready: None,
        }
    }

    fn record(&mut self, fired: Fired) -> usize {
        let mut count = 0;
        for (unit, trigger) in fired {
            let Some(record) = self.registry.get(unit) else {
                continue;
            };
            record.slot.record(trigger);
            let root = record.root;
            self.pending.insert(root);
            count += 1;
        }
        count
    }

    fn slot(&self, unit: UnitId) -> Result<&Arc<UnitSlot>, SchedulerError> {
        self.registry
            .get(unit)
            .map(|r| &r.slot)
            .ok_or(SchedulerError::UnknownUnit(unit))
    }

    fn add_condition(
        &mut self,
        unit: UnitId,
        condition: ArmingCondition,
        now: Duration,
    ) -> Result<ConditionId, SchedulerError> {
        if !self.registry.contains(unit) {
            return Err(SchedulerError::UnknownUnit(unit));
        }
        let id = self.buckets.arm(unit, condition, now)?;
        if let Some(record) = self.registry.get_mut(unit) {
            record.conditions.push(id);
        }
        Ok(id)
    }

    fn replace_condition(
        &mut self,
        unit: UnitId,
        condition: ArmingCondition,
        now: Duration,
    ) -> Result<ConditionId, SchedulerError> {
        let id = self.add_condition(unit, condition, now)?;
        let previous = self
            .registry
            .get_mut(unit)
            .and_then(|r| r.current.replace(id));
        if let Some(previous) = previous {
            self.remove_condition(previous);
        }
        Ok(id)
    }

    fn remove_condition(&mut self, id: ConditionId) -> bool {
        let Some(unit) = self.buckets.disarm(id) else {
            return false;
        };
        if let Some(record) = self.registry.get_mut(unit) {
            record.conditions.retain(|c| *c != id);
            if record.current == Some(id) {
                record.current = None;
            }
        }
        true
    }

    fn remove_unit(&mut self, unit: UnitId) -> Option<Arc<UnitSlot>> {
        let record = self.registry.remove(unit)?;
        for id in &record.conditions {
            self.buckets.disarm(*id);
        }
        self.pending.shift_remove(&unit);
        if let Some(root) = record.next.and_then(|n| self.registry.root_of(n)) {
            self.requeue_chain(root);
        }
        Some(record.slot)
    }

    /// Re-point pending entries at the current chain roots after a relink.
    fn remap_pending(&mut self) {
        let roots: Vec<UnitId> = self.pending.drain(..).collect();
        for unit in roots {
            if let Some(root) = self.registry.root_of(unit) {
                self.pending.insert(root);
            }
        }
    }

    fn requeue_chain(&mut self, root: UnitId) {
        if self
            .registry
            .resolve_chain(root)
            .iter()
            .any(|slot| slot.has_pending())
        {
            self.pending.insert(root);
        }
    }

    /// Give `task` to the lowest-index idle worker. Returns it if none is
    /// idle or the backlog already holds earlier work.
    fn hand_to_worker(&mut self, task: ChainTask) -> Option<ChainTask> {
        if !self.backlog.is_empty() {
            return Some(task);
        }
        let mut task = task;
        for worker in &mut self.workers {
            if !worker.is_idle() {
                continue;
            }
            match worker.run_task(task) {
                Ok(()) => return None,
                Err(returned) => task = returned,
            }
        }
        Some(task)
    }

    /// File a finished chain. Returns `true` if it completed the batch.
    fn file_result(&mut self, task: ChainTask) -> bool {
        let Some(flight) = self.in_flight.as_mut() else {
            tracing::warn!(frame = %task.frame, "finished chain with no batch in flight");
            return false;
        };
        if flight.frame != task.frame || task.seq >= flight.slots.len() {
            tracing::warn!(
                frame = %task.frame,
                in_flight = %flight.frame,
                "finished chain does not belong to the batch in flight"
            );
            return false;
        }
        let seq = task.seq;
        flight.slots[seq] = Some(task);
        flight.outstanding -= 1;
        if flight.outstanding == 0 {
            self.seal_batch();
            true
        } else {
            false
        }
    }

    fn seal_batch(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            let chains = flight.slots.into_iter().flatten().collect();
            self.ready = Some(CommitBatch::new(
                flight.frame,
                chains,
                flight.started.elapsed(),
            ));
        }
    }
}

/// State shared by the scheduler handles and the worker threads.
pub(crate) struct SchedulerShared {
    state: Mutex<SchedulerState>,
    batch_ready: Condvar,
    clock: Arc<dyn Clock>,
    shutting_down: AtomicBool,
    committed: Arc<CommitSignal>,
}

impl SchedulerShared {
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Called when a chain finished computing. A worker gets back the next
    /// backlog chain, or is marked idle.
    pub(crate) fn notify_done(&self, worker: Option<usize>, task: ChainTask) -> Option<ChainTask> {
        let mut state = self.state.lock();
        if state.file_result(task) {
            self.batch_ready.notify_all();
        }
        let worker = worker?;
        if !self.is_shutting_down() {
            if let Some(next) = state.backlog.pop_front() {
                return Some(next);
            }
        }
        if let Some(mailbox) = state.workers.get_mut(worker) {
            mailbox.set_idle();
        }
        None
    }
}

// ── SchedulerHandle ────────────────────────────────────────────────

/// Cloneable access to a running [`Scheduler`].
///
/// Processors and application threads hold handles to arm conditions,
/// post events, and adjust units. Holding a handle does not keep the
/// worker pool alive; once the owning [`Scheduler`] shuts down, mutating
/// calls fail with [`SchedulerError::ShuttingDown`].
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<SchedulerShared>,
}

impl SchedulerHandle {
    fn check_running(&self) -> Result<(), SchedulerError> {
        if self.shared.is_shutting_down() {
            Err(SchedulerError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    pub(crate) fn commit_signal(&self) -> Arc<CommitSignal> {
        Arc::clone(&self.shared.committed)
    }

    // ── Registration ───────────────────────────────────────────

    /// Register a processor as a new unit.
    ///
    /// Calls [`Processor::initialize`]; if it returns a condition, that
    /// condition is installed as the unit's current one. An invalid
    /// initial condition rolls the registration back.
    pub fn register(
        &self,
        processor: Box<dyn Processor>,
        flags: UnitFlags,
    ) -> Result<UnitId, SchedulerError> {
        self.check_running()?;
        let mut processor = processor;
        let initial = processor.initialize();
        let now = self.shared.clock.now();

        let mut state = self.shared.state.lock();
        self.check_running()?;
        let id = state
            .registry
            .insert(|id| UnitSlot::new(id, flags, processor));
        if let Some(condition) = initial {
            if let Err(err) = state.replace_condition(id, condition, now) {
                let removed = state.remove_unit(id);
                drop(state);
                drop(removed);
                return Err(err);
            }
        }
        tracing::debug!(unit = %id, "registered unit");
        Ok(id)
    }

    /// Remove a unit and disarm all of its conditions. An activation
    /// already dispatched still computes and commits. Returns `false` for
    /// an unknown unit.
    pub fn remove(&self, unit: UnitId) -> bool {
        let removed = self.shared.state.lock().remove_unit(unit);
        match removed {
            Some(slot) => {
                tracing::debug!(unit = %unit, name = %slot.name(), "removed unit");
                true
            }
            None => false,
        }
    }

    /// Attach a unit to an owner so the owner can remove its units in one
    /// call.
    pub fn attach(&self, unit: UnitId, owner: OwnerId) -> Result<(), SchedulerError> {
        self.shared.state.lock().registry.attach(unit, owner)
    }

    /// Detach a unit from its owner, returning the owner.
    pub fn detach(&self, unit: UnitId) -> Option<OwnerId> {
        self.shared.state.lock().registry.detach(unit)
    }

    /// Owner a unit is attached to.
    pub fn owner_of(&self, unit: UnitId) -> Option<OwnerId> {
        self.shared
            .state
            .lock()
            .registry
            .get(unit)
            .and_then(|r| r.owner)
    }

    /// Remove every unit attached to `owner`. Returns how many were
    /// removed.
    pub fn remove_owner(&self, owner: OwnerId) -> usize {
        let removed: Vec<Arc<UnitSlot>> = {
            let mut state = self.shared.state.lock();
            let units = state.registry.units_of(owner);
            units
                .into_iter()
                .filter_map(|u| state.remove_unit(u))
                .collect()
        };
        tracing::debug!(owner = %owner, units = removed.len(), "removed owner");
        removed.len()
    }

    // ── Conditions ─────────────────────────────────────────────

    /// Arm an additional condition for `unit`.
    pub fn arm(
        &self,
        unit: UnitId,
        condition: ArmingCondition,
    ) -> Result<ConditionId, SchedulerError> {
        self.check_running()?;
        let now = self.shared.clock.now();
        self.shared
            .state
            .lock()
            .add_condition(unit, condition, now)
    }

    /// Remove a condition from every bucket it occupies. Idempotent:
    /// returns `false` if it was not armed.
    pub fn disarm(&self, condition: ConditionId) -> bool {
        self.shared.state.lock().remove_condition(condition)
    }

    /// Replace the unit's current condition. The previous current
    /// condition is disarmed; conditions added with [`arm`](Self::arm)
    /// are left alone.
    pub fn set_arming_condition(
        &self,
        unit: UnitId,
        condition: ArmingCondition,
    ) -> Result<ConditionId, SchedulerError> {
        self.check_running()?;
        let now = self.shared.clock.now();
        self.shared
            .state
            .lock()
            .replace_condition(unit, condition, now)
    }

    /// The condition installed by the last
    /// [`set_arming_condition`](Self::set_arming_condition).
    pub fn current_condition(&self, unit: UnitId) -> Option<ConditionId> {
        self.shared
            .state
            .lock()
            .registry
            .get(unit)
            .and_then(|r| r.current)
    }

    /// Every condition armed for `unit`.
    pub fn conditions_of(&self, unit: UnitId) -> Vec<ConditionId> {
        self.shared
            .state
            .lock()
            .registry
            .get(unit)
            .map(|r| r.conditions.to_vec())
            .unwrap_or_default()
    }

    /// Fire every post-event condition listening for `event`. Returns the
    /// number of conditions that fired.
    pub fn distribute_post_event(&self, event: EventId) -> usize {
        let mut state = self.shared.state.lock();
        let fired = state.buckets.distribute(event);
        let count = state.record(fired);
        tracing::trace!(event = %event, fired = count, "post event distributed");
        count
    }

    /// Registrations per bucket.
    pub fn bucket_sizes(&self) -> BucketSizes {
        self.shared.state.lock().buckets.sizes()
    }

    // ── Chains ─────────────────────────────────────────────────

    /// Set or clear `unit`'s chain successor. Links that would create a
    /// cycle, or give a unit two predecessors, are rejected.
    pub fn set_next_in_chain(
        &self,
        unit: UnitId,
        next: Option<UnitId>,
    ) -> Result<(), SchedulerError> {
        let mut state = self.shared.state.lock();
        let detached = state.registry.set_next(unit, next)?;
        state.remap_pending();
        if let Some(old) = detached {
            state.requeue_chain(old);
        }
        Ok(())
    }

    /// `unit`'s chain successor.
    pub fn next_in_chain(&self, unit: UnitId) -> Option<UnitId> {
        self.shared
            .state
            .lock()
            .registry
            .get(unit)
            .and_then(|r| r.next)
    }

    /// The whole chain containing `unit`, root first.
    pub fn chain_of(&self, unit: UnitId) -> Vec<UnitId> {
        let state = self.shared.state.lock();
        let Some(root) = state.registry.root_of(unit) else {
            return Vec::new();
        };
        state
            .registry
            .resolve_chain(root)
            .iter()
            .map(|s| s.id())
            .collect()
    }

    // ── Unit state ─────────────────────────────────────────────

    /// Current flags of `unit`.
    pub fn flags(&self, unit: UnitId) -> Option<UnitFlags> {
        self.shared.state.lock().slot(unit).ok().map(|s| s.flags())
    }

    /// Replace all flags of `unit`. Takes effect at the next dispatch or
    /// commit that reads them.
    pub fn set_flags(&self, unit: UnitId, flags: UnitFlags) -> Result<(), SchedulerError> {
        self.shared.state.lock().slot(unit)?.set_flags(flags);
        Ok(())
    }

    /// Enable or disable `unit`.
    pub fn set_enabled(&self, unit: UnitId, enabled: bool) -> Result<(), SchedulerError> {
        self.update_flags(unit, |f| f.enabled = enabled)
    }

    /// Set whether `unit`'s commit runs with the external lock released.
    pub fn set_swing_safe(&self, unit: UnitId, swing_safe: bool) -> Result<(), SchedulerError> {
        self.update_flags(unit, |f| f.swing_safe = swing_safe)
    }

    /// Set whether `unit`'s chain computes on the render thread.
    pub fn set_run_in_renderer(
        &self,
        unit: UnitId,
        run_in_renderer: bool,
    ) -> Result<(), SchedulerError> {
        self.update_flags(unit, |f| f.run_in_renderer = run_in_renderer)
    }

    fn update_flags(
        &self,
        unit: UnitId,
        update: impl FnOnce(&mut UnitFlags),
    ) -> Result<(), SchedulerError> {
        let state = self.shared.state.lock();
        let slot = state.slot(unit)?;
        let mut flags = slot.flags();
        update(&mut flags);
        slot.set_flags(flags);
        Ok(())
    }

    /// Lifecycle phase of `unit`.
    pub fn unit_phase(&self, unit: UnitId) -> Option<UnitPhase> {
        self.shared.state.lock().slot(unit).ok().map(|s| s.phase())
    }

    /// Processor name of `unit`.
    pub fn unit_name(&self, unit: UnitId) -> Option<String> {
        self.shared
            .state
            .lock()
            .slot(unit)
            .ok()
            .map(|s| s.name().to_owned())
    }

    /// Number of registered units.
    pub fn unit_count(&self) -> usize {
        self.shared.state.lock().registry.len()
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.shared.state.lock().workers.len()
    }

    /// Most recently started frame.
    pub fn current_frame(&self) -> FrameId {
        self.shared.state.lock().frame
    }

    // ── Frame pipeline ─────────────────────────────────────────

    /// Start a new frame: fire new-frame, timer, and input conditions, then
    /// dispatch every triggered chain.
    ///
    /// Chains go to idle workers in trigger order, or to the FIFO backlog.
    /// Chains whose root runs in the renderer are computed inline on the
    /// calling thread before this returns. If the previous batch is still
    /// in flight or uncommitted, dispatch is deferred to a later tick.
    pub fn trigger_new_frame(&self) -> FrameDispatch {
        let now = self.shared.clock.now();
        let mut inline = Vec::new();
        let dispatch = {
            let mut state = self.shared.state.lock();
            state.frame = state.frame.next();
            let frame = state.frame;
            let mut dispatch = FrameDispatch {
                frame,
                ..FrameDispatch::default()
            };

            let fired = state.buckets.fire_new_frame(frame);
            dispatch.fired += state.record(fired);
            let fired = state.buckets.fire_timers(now);
            dispatch.fired += state.record(fired);
            let fired = state.buckets.poll_inputs();
            dispatch.fired += state.record(fired);

            if self.shared.is_shutting_down() {
                dispatch.deferred = true;
                return dispatch;
            }
            if state.in_flight.is_some() || state.ready.is_some() {
                tracing::debug!(
                    frame = %frame,
                    pending = state.pending.len(),
                    "previous batch not committed; dispatch deferred"
                );
                dispatch.deferred = true;
                return dispatch;
            }

            let roots: Vec<UnitId> = state.pending.drain(..).collect();
            let mut slots: Vec<Option<ChainTask>> = Vec::with_capacity(roots.len());
            for root in roots {
                let Some(head) = state.registry.get(root) else {
                    continue;
                };
                let in_renderer = head.slot.flags().run_in_renderer;
                let mut links: SmallVec<[ChainLink; 4]> = SmallVec::new();
                for unit in state.registry.resolve_chain(root) {
                    if !unit.is_enabled() {
                        if unit.has_pending() {
                            dispatch.skipped_disabled += 1;
                        }
                        unit.discard_pending();
                        continue;
                    }
                    let arming = unit.take_for_dispatch();
                    links.push(ChainLink { unit, arming });
                }
                if links.is_empty() {
                    continue;
                }
                let task = ChainTask::new(slots.len(), frame, links);
                slots.push(None);
                if in_renderer {
                    dispatch.in_renderer += 1;
                    inline.push(task);
                } else if let Some(task) = state.hand_to_worker(task) {
                    state.backlog.push_back(task);
                    dispatch.queued += 1;
                } else {
                    dispatch.to_workers += 1;
                }
            }

            dispatch.chains = slots.len();
            let outstanding = slots.len();
            state.in_flight = Some(InFlight {
                frame,
                slots,
                outstanding,
                started: Instant::now(),
            });
            if outstanding == 0 {
                state.seal_batch();
                self.shared.batch_ready.notify_all();
            }
            tracing::trace!(
                frame = %frame,
                fired = dispatch.fired,
                chains = dispatch.chains,
                queued = dispatch.queued,
                "frame dispatched"
            );
            dispatch
        };

        for mut task in inline {
            task.run_compute();
            self.shared.notify_done(None, task);
        }
        dispatch
    }

    /// Whether a batch is computing or waiting to be committed.
    pub fn batch_pending(&self) -> bool {
        let state = self.shared.state.lock();
        state.in_flight.is_some() || state.ready.is_some()
    }

    /// Block until every chain of the dispatched frame has computed, and
    /// take the batch for committing.
    ///
    /// Returns `None` if no batch is pending, on timeout, or on shutdown.
    /// `None` for `timeout` waits indefinitely.
    pub fn wait_for_batch(&self, timeout: Option<Duration>) -> Option<CommitBatch> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.shared.state.lock();
        loop {
            if let Some(batch) = state.ready.take() {
                return Some(batch);
            }
            if state.in_flight.is_none() || self.shared.is_shutting_down() {
                return None;
            }
            match deadline {
                None => self.shared.batch_ready.wait(&mut state),
                Some(deadline) => {
                    if self
                        .shared
                        .batch_ready
                        .wait_until(&mut state, deadline)
                        .timed_out()
                    {
                        return state.ready.take();
                    }
                }
            }
        }
    }

    /// Most recently committed frame.
    pub fn last_committed(&self) -> FrameId {
        self.shared.committed.last()
    }

    /// Block until `frame` has been committed. Returns `false` on timeout
    /// or shutdown.
    pub fn wait_committed(&self, frame: FrameId, timeout: Duration) -> bool {
        let shared = &self.shared;
        shared
            .committed
            .wait_for(frame, timeout, || shared.is_shutting_down())
    }
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("shutting_down", &self.shared.is_shutting_down())
            .finish_non_exhaustive()
    }
}

// ── Scheduler ──────────────────────────────────────────────────────

/// Owner of the scheduling core and its worker pool.
///
/// Dereferences to [`SchedulerHandle`] for the registration and frame
/// API. Dropping the scheduler shuts it down.
pub struct Scheduler {
    handle: SchedulerHandle,
    pool: Option<WorkerPool>,
}

impl Scheduler {
    /// Start a scheduler on the system clock.
    pub fn new(config: &EngineConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Start a scheduler whose timers read `clock`.
    pub fn with_clock(config: &EngineConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        let shared = Arc::new(SchedulerShared {
            state: Mutex::new(SchedulerState::new()),
            batch_ready: Condvar::new(),
            clock,
            shutting_down: AtomicBool::new(false),
            committed: Arc::new(CommitSignal::default()),
        });
        let (pool, mailboxes) = WorkerPool::spawn(config.resolved_worker_count(), &shared)?;
        shared.state.lock().workers = mailboxes;
        tracing::info!(workers = pool.len(), "scheduler started");
        Ok(Self {
            handle: SchedulerHandle { shared },
            pool: Some(pool),
        })
    }

    /// A cloneable handle to this scheduler.
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.pool.is_none()
    }

    /// Stop the worker pool and release every unit.
    ///
    /// Workers finish the chain they are running and exit without starting
    /// queued ones. Returns the number of workers joined. Idempotent.
    pub fn shutdown(&mut self) -> usize {
        let Some(pool) = self.pool.take() else {
            return 0;
        };
        let shared = &self.handle.shared;
        shared.shutting_down.store(true, Ordering::Release);
        {
            let mut state = shared.state.lock();
            for worker in &mut state.workers {
                worker.close();
            }
            let dropped = state.backlog.len();
            state.backlog.clear();
            if dropped > 0 {
                tracing::debug!(chains = dropped, "dropped queued chains at shutdown");
            }
        }
        shared.batch_ready.notify_all();
        shared.committed.wake_all();

        let joined = pool.join();

        // Processors may hold handles back into the scheduler; drop them
        // outside the lock.
        let (registry, ready) = {
            let mut state = shared.state.lock();
            state.in_flight = None;
            state.pending.clear();
            state.buckets.clear();
            (
                std::mem::take(&mut state.registry),
                state.ready.take(),
            )
        };
        drop(ready);
        drop(registry);

        tracing::info!(workers_joined = joined, "scheduler shut down");
        joined
    }
}

impl Deref for Scheduler {
    type Target = SchedulerHandle;

    fn deref(&self) -> &SchedulerHandle {
        &self.handle
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strobe_core::{ArmingCollection, ProcessorError};

    struct Quiet {
        initial: Option<ArmingCondition>,
    }

    impl Processor for Quiet {
        fn name(&self) -> &str {
            "quiet"
        }
        fn initialize(&mut self) -> Option<ArmingCondition> {
            self.initial.take()
        }
        fn compute(&mut self, _: &ArmingCollection) -> Result<(), ProcessorError> {
            Ok(())
        }
        fn commit(&mut self, _: &ArmingCollection) -> Result<(), ProcessorError> {
            Ok(())
        }
    }

    fn scheduler(workers: usize) -> Scheduler {
        Scheduler::new(&EngineConfig::with_workers(workers)).unwrap()
    }

    fn quiet(initial: Option<ArmingCondition>) -> Box<dyn Processor> {
        Box::new(Quiet { initial })
    }

    #[test]
    fn starts_and_shuts_down() {
        let mut s = scheduler(3);
        assert_eq!(s.worker_count(), 3);
        assert_eq!(s.shutdown(), 3);
        assert_eq!(s.shutdown(), 0);
        assert!(s.is_shut_down());
    }

    #[test]
    fn invalid_config_rejected() {
        assert!(matches!(
            Scheduler::new(&EngineConfig::with_workers(0)),
            Err(ConfigError::ZeroWorkers)
        ));
    }

    #[test]
    fn register_installs_initial_condition() {
        let s = scheduler(1);
        let unit = s
            .register(quiet(Some(ArmingCondition::NewFrame)), UnitFlags::default())
            .unwrap();
        assert!(s.current_condition(unit).is_some());
        assert_eq!(s.bucket_sizes().new_frame, 1);
        assert_eq!(s.unit_name(unit).as_deref(), Some("quiet"));
    }

    #[test]
    fn invalid_initial_condition_rolls_back() {
        let s = scheduler(1);
        let err = s
            .register(
                quiet(Some(ArmingCondition::timer(Duration::ZERO))),
                UnitFlags::default(),
            )
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCondition(_)));
        assert_eq!(s.unit_count(), 0);
    }

    #[test]
    fn set_arming_condition_replaces_current() {
        let s = scheduler(1);
        let unit = s.register(quiet(None), UnitFlags::default()).unwrap();
        let extra = s.arm(unit, ArmingCondition::post_event([EventId(1)])).unwrap();
        let first = s.set_arming_condition(unit, ArmingCondition::NewFrame).unwrap();
        let second = s
            .set_arming_condition(unit, ArmingCondition::timer(Duration::from_millis(5)))
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(s.current_condition(unit), Some(second));
        assert_eq!(s.conditions_of(unit), vec![extra, second]);
        assert!(!s.disarm(first));
        assert!(s.disarm(extra));
        assert!(!s.disarm(extra));
    }

    #[test]
    fn remove_disarms_everything() {
        let s = scheduler(1);
        let unit = s
            .register(quiet(Some(ArmingCondition::NewFrame)), UnitFlags::default())
            .unwrap();
        s.arm(unit, ArmingCondition::post_event([EventId(2)])).unwrap();
        assert!(s.remove(unit));
        assert!(!s.remove(unit));
        assert_eq!(s.bucket_sizes(), BucketSizes::default());
        assert!(matches!(
            s.arm(unit, ArmingCondition::NewFrame),
            Err(SchedulerError::UnknownUnit(_))
        ));
    }

    #[test]
    fn empty_frame_yields_empty_batch() {
        let s = scheduler(1);
        let dispatch = s.trigger_new_frame();
        assert_eq!(dispatch.frame, FrameId(1));
        assert_eq!(dispatch.chains, 0);
        let batch = s.wait_for_batch(Some(Duration::from_secs(5))).unwrap();
        assert!(batch.is_empty());
        assert!(s.wait_for_batch(Some(Duration::from_millis(1))).is_none());
    }

    #[test]
    fn uncommitted_batch_defers_dispatch() {
        let s = scheduler(1);
        s.register(quiet(Some(ArmingCondition::NewFrame)), UnitFlags::default())
            .unwrap();
        let first = s.trigger_new_frame();
        assert!(!first.deferred);
        // The first batch is never taken, so the second tick defers.
        let second = s.trigger_new_frame();
        assert!(second.deferred);
        assert_eq!(second.chains, 0);
        let batch = s.wait_for_batch(Some(Duration::from_secs(5))).unwrap();
        assert_eq!(batch.frame(), FrameId(1));
    }

    #[test]
    fn handle_rejects_after_shutdown() {
        let mut s = scheduler(1);
        let handle = s.handle();
        s.shutdown();
        assert_eq!(
            handle.register(quiet(None), UnitFlags::default()),
            Err(SchedulerError::ShuttingDown)
        );
        assert_eq!(handle.unit_count(), 0);
    }

    #[test]
    fn remove_owner_removes_attached_units() {
        let s = scheduler(1);
        let a = s.register(quiet(None), UnitFlags::default()).unwrap();
        let b = s.register(quiet(None), UnitFlags::default()).unwrap();
        let c = s.register(quiet(None), UnitFlags::default()).unwrap();
        s.attach(a, OwnerId(7)).unwrap();
        s.attach(b, OwnerId(7)).unwrap();
        assert_eq!(s.owner_of(a), Some(OwnerId(7)));
        assert_eq!(s.remove_owner(OwnerId(7)), 2);
        assert_eq!(s.unit_count(), 1);
        assert!(s.flags(c).is_some());
        assert!(s.flags(a).is_none());
    }
}
