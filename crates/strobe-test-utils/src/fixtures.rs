//! Synchronisation and render fixtures for threaded tests.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use strobe_core::{FrameId, RenderTarget};

/// A one-way gate: threads block in [`wait`](Gate::wait) until it opens.
#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

#[derive(Default)]
struct GateState {
    open: bool,
    waiting: usize,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the gate opens.
    pub fn wait(&self) {
        let (state, cond) = &*self.inner;
        let mut s = state.lock();
        s.waiting += 1;
        cond.notify_all();
        while !s.open {
            cond.wait(&mut s);
        }
        s.waiting -= 1;
    }

    pub fn open(&self) {
        let (state, cond) = &*self.inner;
        state.lock().open = true;
        cond.notify_all();
    }

    /// Block until at least `n` threads are waiting, or `timeout` passes.
    pub fn await_waiters(&self, n: usize, timeout: Duration) -> bool {
        let (state, cond) = &*self.inner;
        let deadline = std::time::Instant::now() + timeout;
        let mut s = state.lock();
        while s.waiting < n {
            if cond.wait_until(&mut s, deadline).timed_out() {
                return s.waiting >= n;
            }
        }
        true
    }
}

/// A [`RenderTarget`] that records every frame it is asked to render.
#[derive(Clone, Default)]
pub struct RecordingTarget {
    frames: Arc<Mutex<Vec<FrameId>>>,
}

impl RecordingTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<FrameId> {
        self.frames.lock().clone()
    }
}

impl RenderTarget for RecordingTarget {
    fn render(&mut self, frame: FrameId) {
        self.frames.lock().push(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn gate_releases_waiters() {
        let gate = Gate::new();
        let waiter = gate.clone();
        let t = thread::spawn(move || waiter.wait());
        assert!(gate.await_waiters(1, Duration::from_secs(5)));
        gate.open();
        t.join().unwrap();
    }

    #[test]
    fn recording_target_records() {
        let mut target = RecordingTarget::new();
        let view = target.clone();
        target.render(FrameId(1));
        target.render(FrameId(2));
        assert_eq!(view.frames(), vec![FrameId(1), FrameId(2)]);
    }
}
