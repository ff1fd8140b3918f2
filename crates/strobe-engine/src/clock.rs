//! Monotonic time sources and frame pacing.
//!
//! Timer conditions measure elapsed time through a [`Clock`] so that tests
//! can drive time by hand with [`ManualClock`]. [`FramePacer`] computes
//! how long the render thread should park to hit the target frame period.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic time source.
///
/// `now()` is the time since an arbitrary, fixed origin. Only differences
/// between readings are meaningful.
pub trait Clock: Send + Sync + 'static {
    /// Current monotonic time.
    fn now(&self) -> Duration;
}

/// Wall-clock-backed [`Clock`] using [`Instant`].
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// A clock whose origin is the moment of construction.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// A [`Clock`] that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

// Compile-time assertion: ManualClock must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<ManualClock>();
};

impl ManualClock {
    /// A clock starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.nanos
            .fetch_add(by.as_nanos() as u64, Ordering::AcqRel);
    }

    /// Jump to an absolute reading. Must not move backwards.
    pub fn set(&self, to: Duration) {
        let to = to.as_nanos() as u64;
        let prev = self.nanos.swap(to, Ordering::AcqRel);
        debug_assert!(prev <= to, "ManualClock moved backwards: {prev} -> {to}");
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }
}

/// Frame-rate pacing for the render loop.
///
/// There is no frame skipping: a frame that overruns its period simply
/// runs long and the next one starts immediately.
#[derive(Debug, Clone)]
pub struct FramePacer {
    period: Duration,
    last_tick: Option<Instant>,
}

impl FramePacer {
    /// A pacer targeting `period` per frame.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_tick: None,
        }
    }

    /// Target frame period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Record a tick at `now` and return the time since the previous tick
    /// (zero for the first).
    pub fn tick(&mut self, now: Instant) -> Duration {
        let elapsed = self
            .last_tick
            .map(|prev| now.saturating_duration_since(prev))
            .unwrap_or(Duration::ZERO);
        self.last_tick = Some(now);
        elapsed
    }

    /// Time left in the period for a frame that has run for `elapsed`, or
    /// `None` if it is already over budget.
    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        self.period
            .checked_sub(elapsed)
            .filter(|remaining| !remaining.is_zero())
    }
}
