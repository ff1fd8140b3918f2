//! Core types and traits for the Strobe frame scheduler.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! vocabulary shared by the scheduling engine and application code: ids,
//! arming conditions and the triggers they produce, the two-phase
//! [`Processor`] contract, and the collaborator traits the engine calls
//! through on the render thread.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod arming;
pub mod condition;
pub mod error;
pub mod id;
pub mod input;
pub mod processor;
pub mod traits;

pub use arming::{ArmingCollection, Trigger};
pub use condition::{ArmingCondition, ConditionKind};
pub use error::{ConditionError, ProcessorError};
pub use id::{ConditionId, EventId, FrameId, OwnerId, UnitId};
pub use input::{InputEvent, InputSource};
pub use processor::{Phase, Processor, UnitFlags};
pub use traits::{ExternalLock, NoExternalLock, RenderTarget};
