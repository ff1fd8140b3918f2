//! Strongly-typed identifiers for units, conditions, events, frames and owners.

use std::fmt;

/// Identifies a registered processor unit.
///
/// A unit id is an arena slot index paired with the slot's generation at
/// registration time. Removing a unit bumps the slot generation, so a stale
/// `UnitId` never aliases a unit registered later into the same slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId {
    index: u32,
    generation: u32,
}

impl UnitId {
    /// Construct a unit id from an arena slot index and generation.
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot index.
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the arena slot when this id was issued.
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Identifies one registered arming condition.
///
/// Allocated monotonically by the scheduler on every `arm`. An `AnyOf`
/// condition registers all of its leaves under a single id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConditionId(pub u64);

impl fmt::Display for ConditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ConditionId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Application-defined id of a posted event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u32);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for EventId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Monotonically increasing frame counter.
///
/// Advanced once per `trigger_new_frame`. Frame 0 is the state before the
/// first tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

impl FrameId {
    /// The frame after this one.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for FrameId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Identifies the entity-like container that owns a unit.
///
/// The scheduler holds only a non-owning registration; owners are an
/// application concept. A unit is attached to at most one owner at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for OwnerId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
