//! Fixed-size worker pool running chain `compute` phases.
//!
//! Each worker owns a bounded(1) mailbox. The scheduler tracks which
//! workers are idle under its own lock and hands a chain to the
//! lowest-index idle worker, so a dispatch never races a worker going
//! idle. A worker that finishes a chain reports back and, if the backlog
//! is non-empty, receives the next queued chain in the same call.
//!
//! Shutdown sets the shared shutdown flag and drops every mailbox sender.
//! A worker finishes the chain it is running, then exits without starting
//! another.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::chain::ChainTask;
use crate::config::ConfigError;
use crate::scheduler::SchedulerShared;

/// Scheduler-side view of one worker.
pub(crate) struct WorkerMailbox {
    index: usize,
    tx: Option<Sender<ChainTask>>,
    idle: bool,
}

impl WorkerMailbox {
    pub fn is_idle(&self) -> bool {
        self.idle && self.tx.is_some()
    }

    pub fn set_idle(&mut self) {
        self.idle = true;
    }

    /// Hand `task` to this worker. Gives the task back if the worker is
    /// busy or gone.
    pub fn run_task(&mut self, task: ChainTask) -> Result<(), ChainTask> {
        if !self.idle {
            return Err(task);
        }
        let Some(tx) = &self.tx else {
            return Err(task);
        };
        match tx.try_send(task) {
            Ok(()) => {
                self.idle = false;
                Ok(())
            }
            Err(TrySendError::Full(task)) => {
                self.idle = false;
                Err(task)
            }
            Err(TrySendError::Disconnected(task)) => {
                tracing::warn!(worker = self.index, "worker mailbox disconnected");
                self.tx = None;
                self.idle = false;
                Err(task)
            }
        }
    }

    /// Drop the sender so the worker's `recv` fails once its mailbox is
    /// empty.
    pub fn close(&mut self) {
        self.tx = None;
        self.idle = false;
    }
}

/// Join handles for the worker threads.
pub(crate) struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers. Each worker reports ready before the next is
    /// spawned, so every mailbox has a listening thread once this returns.
    pub fn spawn(
        count: usize,
        shared: &Arc<SchedulerShared>,
    ) -> Result<(Self, Vec<WorkerMailbox>), ConfigError> {
        let mut handles = Vec::with_capacity(count);
        let mut mailboxes = Vec::with_capacity(count);
        for index in 0..count {
            let (tx, rx) = crossbeam_channel::bounded::<ChainTask>(1);
            let (ready_tx, ready_rx) = crossbeam_channel::bounded::<()>(1);
            let worker_shared = Arc::clone(shared);
            let spawned = thread::Builder::new()
                .name(format!("strobe-worker-{index}"))
                .spawn(move || worker_loop(index, rx, ready_tx, worker_shared));
            let handle = match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    Self::abort(handles, mailboxes);
                    return Err(ConfigError::ThreadSpawnFailed {
                        reason: format!("worker {index}: {e}"),
                    });
                }
            };
            if ready_rx.recv().is_err() {
                Self::abort(handles, mailboxes);
                return Err(ConfigError::ThreadSpawnFailed {
                    reason: format!("worker {index} exited before reporting ready"),
                });
            }
            handles.push(handle);
            mailboxes.push(WorkerMailbox {
                index,
                tx: Some(tx),
                idle: true,
            });
        }
        tracing::debug!(workers = count, "worker pool started");
        Ok((Self { handles }, mailboxes))
    }

    fn abort(handles: Vec<JoinHandle<()>>, mailboxes: Vec<WorkerMailbox>) {
        drop(mailboxes);
        for handle in handles {
            let _ = handle.join();
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Join every worker. Mailboxes must already be closed. Returns the
    /// number of workers that exited cleanly.
    pub fn join(self) -> usize {
        let mut joined = 0;
        for handle in self.handles {
            if handle.join().is_ok() {
                joined += 1;
            }
        }
        joined
    }
}

fn worker_loop(
    index: usize,
    rx: Receiver<ChainTask>,
    ready_tx: Sender<()>,
    shared: Arc<SchedulerShared>,
) {
    let _ = ready_tx.send(());
    drop(ready_tx);

    while let Ok(task) = rx.recv() {
        if shared.is_shutting_down() {
            break;
        }
        let mut next = Some(task);
        while let Some(mut task) = next.take() {
            task.run_compute();
            next = shared.notify_done(Some(index), task);
        }
    }
    tracing::debug!(worker = index, "worker exiting");
}
