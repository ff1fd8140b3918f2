//! Test utilities and mock types for Strobe development.
//!
//! Provides a shared [`EventLog`], a scriptable [`RecordingProcessor`],
//! and mock implementations of the collaborator traits
//! ([`ExternalLock`], [`InputSource`], [`RenderTarget`](strobe_core::RenderTarget)).

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;
use strobe_core::{
    ArmingCollection, ArmingCondition, ExternalLock, InputEvent, InputSource, Phase, Processor,
    ProcessorError,
};

pub use fixtures::{Gate, RecordingTarget};

// ── EventLog ───────────────────────────────────────────────────────

/// One recorded processor phase.
#[derive(Clone, Debug)]
pub struct LogEntry {
    /// Global order in which the entry was recorded.
    pub seq: u64,
    /// Label of the recording processor.
    pub label: String,
    pub phase: Phase,
    pub thread: ThreadId,
    pub thread_name: Option<String>,
    /// Triggers the phase was called with.
    pub arming: ArmingCollection,
    /// Whether the observed external lock was held, if one is observed.
    pub lock_held: Option<bool>,
}

/// Shared, ordered record of processor phases across threads.
#[derive(Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
    seq: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        label: &str,
        phase: Phase,
        arming: &ArmingCollection,
        lock_held: Option<bool>,
    ) {
        let mut entries = self.entries.lock();
        let current = thread::current();
        entries.push(LogEntry {
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            label: label.to_owned(),
            phase,
            thread: current.id(),
            thread_name: current.name().map(str::to_owned),
            arming: arming.clone(),
            lock_held,
        });
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Labels of every entry for `phase`, in recording order.
    pub fn labels(&self, phase: Phase) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.phase == phase)
            .map(|e| e.label.clone())
            .collect()
    }

    pub fn computes(&self) -> Vec<String> {
        self.labels(Phase::Compute)
    }

    pub fn commits(&self) -> Vec<String> {
        self.labels(Phase::Commit)
    }

    pub fn count(&self, label: &str, phase: Phase) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.phase == phase && e.label == label)
            .count()
    }

    /// Entries for `label` and `phase`, in recording order.
    pub fn of(&self, label: &str, phase: Phase) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.phase == phase && e.label == label)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

// ── RecordingProcessor ─────────────────────────────────────────────

/// How a scripted phase misbehaves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Fault {
    #[default]
    None,
    /// Return `Err(ProcessorError::ExecutionFailed)`.
    Error,
    /// Panic.
    Panic,
}

type Hook = Box<dyn FnMut(&ArmingCollection) + Send>;

/// A [`Processor`] that logs each phase to an [`EventLog`].
///
/// Configure with the builder methods before registering.
pub struct RecordingProcessor {
    label: String,
    log: EventLog,
    initial: Option<ArmingCondition>,
    compute_fault: Fault,
    commit_fault: Fault,
    compute_delay: Duration,
    observed_lock: Option<Arc<CountingLock>>,
    compute_hook: Option<Hook>,
    commit_hook: Option<Hook>,
}

impl RecordingProcessor {
    pub fn new(label: impl Into<String>, log: &EventLog) -> Self {
        Self {
            label: label.into(),
            log: log.clone(),
            initial: None,
            compute_fault: Fault::None,
            commit_fault: Fault::None,
            compute_delay: Duration::ZERO,
            observed_lock: None,
            compute_hook: None,
            commit_hook: None,
        }
    }

    /// Return `condition` from `initialize()`.
    pub fn armed(mut self, condition: ArmingCondition) -> Self {
        self.initial = Some(condition);
        self
    }

    pub fn failing_compute(mut self, fault: Fault) -> Self {
        self.compute_fault = fault;
        self
    }

    pub fn failing_commit(mut self, fault: Fault) -> Self {
        self.commit_fault = fault;
        self
    }

    /// Sleep this long in every `compute()`.
    pub fn with_compute_delay(mut self, delay: Duration) -> Self {
        self.compute_delay = delay;
        self
    }

    /// Record whether `lock` is held at each phase.
    pub fn observing_lock(mut self, lock: &Arc<CountingLock>) -> Self {
        self.observed_lock = Some(Arc::clone(lock));
        self
    }

    /// Run `hook` at the start of every `compute()`.
    pub fn on_compute(mut self, hook: impl FnMut(&ArmingCollection) + Send + 'static) -> Self {
        self.compute_hook = Some(Box::new(hook));
        self
    }

    /// Run `hook` at the start of every `commit()`.
    pub fn on_commit(mut self, hook: impl FnMut(&ArmingCollection) + Send + 'static) -> Self {
        self.commit_hook = Some(Box::new(hook));
        self
    }

    pub fn boxed(self) -> Box<dyn Processor> {
        Box::new(self)
    }

    fn run(&mut self, phase: Phase, arming: &ArmingCollection) -> Result<(), ProcessorError> {
        let hook = match phase {
            Phase::Compute => self.compute_hook.as_mut(),
            Phase::Commit => self.commit_hook.as_mut(),
        };
        if let Some(hook) = hook {
            hook(arming);
        }
        if phase == Phase::Compute && !self.compute_delay.is_zero() {
            thread::sleep(self.compute_delay);
        }
        let lock_held = self.observed_lock.as_ref().map(|l| l.is_held());
        self.log.record(&self.label, phase, arming, lock_held);
        let fault = match phase {
            Phase::Compute => self.compute_fault,
            Phase::Commit => self.commit_fault,
        };
        match fault {
            Fault::None => Ok(()),
            Fault::Error => Err(ProcessorError::failed(format!(
                "{} refused {phase:?}",
                self.label
            ))),
            Fault::Panic => panic!("{} panicked in {phase:?}", self.label),
        }
    }
}

impl Processor for RecordingProcessor {
    fn name(&self) -> &str {
        &self.label
    }

    fn initialize(&mut self) -> Option<ArmingCondition> {
        self.initial.take()
    }

    fn compute(&mut self, arming: &ArmingCollection) -> Result<(), ProcessorError> {
        self.run(Phase::Compute, arming)
    }

    fn commit(&mut self, arming: &ArmingCollection) -> Result<(), ProcessorError> {
        self.run(Phase::Commit, arming)
    }
}

// ── CountingLock ───────────────────────────────────────────────────

/// An [`ExternalLock`] that counts releases and reacquisitions.
#[derive(Debug)]
pub struct CountingLock {
    held: AtomicBool,
    releases: AtomicU32,
    reacquires: AtomicU32,
}

impl CountingLock {
    pub fn new(held: bool) -> Arc<Self> {
        Arc::new(Self {
            held: AtomicBool::new(held),
            releases: AtomicU32::new(0),
            reacquires: AtomicU32::new(0),
        })
    }

    pub fn set_held(&self, held: bool) {
        self.held.store(held, Ordering::SeqCst);
    }

    pub fn releases(&self) -> u32 {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn reacquires(&self) -> u32 {
        self.reacquires.load(Ordering::SeqCst)
    }
}

impl ExternalLock for CountingLock {
    fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn reacquire(&self) {
        self.held.store(true, Ordering::SeqCst);
        self.reacquires.fetch_add(1, Ordering::SeqCst);
    }
}

// ── MockInputSource ────────────────────────────────────────────────

/// An [`InputSource`] that counts how often it is drained.
#[derive(Debug, Default)]
pub struct MockInputSource {
    queue: Mutex<VecDeque<InputEvent>>,
    drains: AtomicU32,
}

impl MockInputSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, event: InputEvent) {
        self.queue.lock().push_back(event);
    }

    pub fn drains(&self) -> u32 {
        self.drains.load(Ordering::SeqCst)
    }
}

impl InputSource for MockInputSource {
    fn buffered_events_pending(&self) -> bool {
        !self.queue.lock().is_empty()
    }

    fn drain_events(&self) -> Vec<InputEvent> {
        self.drains.fetch_add(1, Ordering::SeqCst);
        self.queue.lock().drain(..).collect()
    }
}
