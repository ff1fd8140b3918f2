//! Strobe: multithreaded processor scheduling with single-thread commit.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the Strobe sub-crates. Adding `strobe` as a single dependency is enough
//! for most applications.
//!
//! # Quick start
//!
//! ```rust
//! use strobe::prelude::*;
//!
//! // Rotates a light by a fixed step every frame.
//! struct Spin {
//!     angle: f32,
//!     next: f32,
//! }
//!
//! impl Processor for Spin {
//!     fn name(&self) -> &str { "spin" }
//!     fn initialize(&mut self) -> Option<ArmingCondition> {
//!         Some(ArmingCondition::NewFrame)
//!     }
//!     fn compute(&mut self, _arming: &ArmingCollection) -> Result<(), ProcessorError> {
//!         self.next = (self.angle + 3.0) % 360.0;
//!         Ok(())
//!     }
//!     fn commit(&mut self, _arming: &ArmingCollection) -> Result<(), ProcessorError> {
//!         self.angle = self.next;
//!         Ok(())
//!     }
//! }
//!
//! let mut engine = LockstepEngine::new(EngineConfig::with_workers(2)).unwrap();
//! engine
//!     .scheduler()
//!     .register(Box::new(Spin { angle: 0.0, next: 0.0 }), UnitFlags::default())
//!     .unwrap();
//! let metrics = engine.step_frame();
//! assert_eq!(metrics.units_committed, 1);
//! assert_eq!(metrics.frame, FrameId(1));
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `strobe-core` | IDs, arming conditions, triggers, the `Processor` trait |
//! | [`engine`] | `strobe-engine` | Scheduler, worker pool, commit sequencer, engines |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`strobe-core`).
///
/// Contains arming conditions and the triggers they produce, the
/// [`types::Processor`] contract, and the collaborator traits
/// [`types::ExternalLock`] and [`types::RenderTarget`].
pub use strobe_core as types;

/// Scheduling engines (`strobe-engine`).
///
/// [`engine::LockstepEngine`] steps frames synchronously on the calling
/// thread; [`engine::RealtimeEngine`] owns a render thread that paces frames
/// on its own.
pub use strobe_engine as engine;

/// Common imports for typical Strobe usage.
///
/// ```rust
/// use strobe::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use strobe_core::{
        ArmingCollection, ArmingCondition, EventId, ExternalLock, FrameId, InputEvent,
        InputSource, NoExternalLock, OwnerId, Processor, RenderTarget, Trigger, UnitFlags, UnitId,
    };

    // Errors
    pub use strobe_core::{ConditionError, ProcessorError};
    pub use strobe_engine::{ConfigError, SchedulerError};

    // Engine
    pub use strobe_engine::{
        EngineConfig, FrameMetrics, InputBuffer, LockstepEngine, RealtimeEngine, Scheduler,
        SchedulerHandle,
    };
}
