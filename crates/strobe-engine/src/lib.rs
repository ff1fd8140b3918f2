//! Frame-synchronised processor scheduling for Strobe.
//!
//! Provides the [`Scheduler`] that arms conditions, fires them on frame
//! ticks, dispatches triggered chains to a worker pool, and hands the
//! computed batch to a [`CommitSequencer`] on the render thread. Supports
//! both lockstep (caller-driven) and realtime (render-thread) modes.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod clock;
pub mod commit;
pub mod config;
pub mod error;
pub mod input;
pub mod lockstep;
pub mod metrics;
pub mod realtime;
pub mod scheduler;

mod buckets;
mod chain;
mod registry;
mod render_thread;
mod unit;
mod worker;

pub use buckets::BucketSizes;
pub use clock::{Clock, FramePacer, ManualClock, SystemClock};
pub use commit::{CommitBatch, CommitReport, CommitSequencer};
pub use config::{ConfigError, EngineConfig, MAX_WORKERS};
pub use error::SchedulerError;
pub use input::InputBuffer;
pub use lockstep::LockstepEngine;
pub use metrics::FrameMetrics;
pub use realtime::{RealtimeEngine, RealtimeStats, ShutdownReport};
pub use scheduler::{FrameDispatch, Scheduler, SchedulerHandle};
pub use unit::UnitPhase;
