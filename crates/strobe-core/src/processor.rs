//! The [`Processor`] trait and per-unit [`UnitFlags`].
//!
//! A processor is one schedulable piece of per-frame application logic with
//! a two-phase contract: `compute` runs on a worker thread in parallel with
//! other units and must not touch scene state; `commit` runs afterwards on
//! the single render thread, in trigger order, and is the only place scene
//! mutations belong.

use crate::arming::ArmingCollection;
use crate::condition::ArmingCondition;
use crate::error::ProcessorError;

/// Which half of the two-phase contract is executing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Parallel-safe computation on a worker thread.
    Compute,
    /// Exclusive, scene-mutating commit on the render thread.
    Commit,
}

/// Application logic scheduled by the processor manager.
///
/// # Contract
///
/// - `initialize()` is called once, at registration, and returns the unit's
///   first arming condition (or `None` to stay unarmed until one is set).
/// - `compute()` may run on any worker thread, concurrently with other
///   units' `compute()`. It must not mutate shared scene state.
/// - `commit()` runs on the render thread only, after every `compute()` of
///   the frame has returned, in trigger order.
/// - Errors and panics from either phase are caught and logged by the
///   scheduler; `commit()` still runs after a failed `compute()`.
///
/// # Examples
///
/// ```
/// use strobe_core::{ArmingCollection, ArmingCondition, Processor, ProcessorError};
///
/// struct Spinner {
///     angle: f32,
///     next_angle: f32,
/// }
///
/// impl Processor for Spinner {
///     fn name(&self) -> &str { "spinner" }
///
///     fn initialize(&mut self) -> Option<ArmingCondition> {
///         Some(ArmingCondition::NewFrame)
///     }
///
///     fn compute(&mut self, _arming: &ArmingCollection) -> Result<(), ProcessorError> {
///         self.next_angle = (self.angle + 1.5) % 360.0;
///         Ok(())
///     }
///
///     fn commit(&mut self, _arming: &ArmingCollection) -> Result<(), ProcessorError> {
///         self.angle = self.next_angle;
///         Ok(())
///     }
/// }
///
/// let mut spinner = Spinner { angle: 0.0, next_angle: 0.0 };
/// assert!(spinner.initialize().is_some());
/// spinner.compute(&ArmingCollection::new()).unwrap();
/// spinner.commit(&ArmingCollection::new()).unwrap();
/// assert_eq!(spinner.angle, 1.5);
/// ```
pub trait Processor: Send + 'static {
    /// Human-readable name for logs and metrics.
    fn name(&self) -> &str;

    /// Called once at registration. Returns the first arming condition.
    fn initialize(&mut self) -> Option<ArmingCondition>;

    /// Parallel phase. `arming` holds every trigger of this activation.
    fn compute(&mut self, arming: &ArmingCollection) -> Result<(), ProcessorError>;

    /// Exclusive phase on the render thread. Sees the same `arming` as the
    /// preceding `compute()`.
    fn commit(&mut self, arming: &ArmingCollection) -> Result<(), ProcessorError>;
}

/// Per-unit scheduling flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnitFlags {
    /// Disabled units are skipped at dispatch and their pending triggers
    /// discarded. Default: `true`.
    pub enabled: bool,
    /// When set, the commit sequencer releases the external UI lock (if the
    /// render thread holds it) around this unit's `commit()`. Default: `false`.
    pub swing_safe: bool,
    /// When set, both phases run on the render thread instead of a worker.
    /// Default: `false`.
    pub run_in_renderer: bool,
}

impl Default for UnitFlags {
    fn default() -> Self {
        Self {
            enabled: true,
            swing_safe: false,
            run_in_renderer: false,
        }
    }
}

impl UnitFlags {
    /// Default flags with `run_in_renderer` set.
    pub fn renderer() -> Self {
        Self {
            run_in_renderer: true,
            ..Self::default()
        }
    }

    /// Default flags with `swing_safe` set.
    pub fn swing_safe() -> Self {
        Self {
            swing_safe: true,
            ..Self::default()
        }
    }
}
