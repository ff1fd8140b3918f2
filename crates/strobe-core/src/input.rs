//! Input collaborator contract polled by `Input` arming conditions.

/// A buffered user-input event.
///
/// Input is delivered to units through the `Input` arming condition: when
/// the source reports pending events at a frame tick, the events are drained
/// and attached to the unit's trigger.
#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
    /// A key changed state.
    Key {
        /// Platform key code.
        code: u32,
        /// `true` on press, `false` on release.
        pressed: bool,
    },
    /// The pointer moved to a new surface position.
    PointerMoved {
        /// Horizontal position in surface pixels.
        x: f32,
        /// Vertical position in surface pixels.
        y: f32,
    },
    /// A pointer button changed state.
    PointerButton {
        /// Button index (0 = primary).
        button: u8,
        /// `true` on press, `false` on release.
        pressed: bool,
    },
    /// Application-defined event with an opaque code.
    Custom {
        /// Application-defined code.
        code: u32,
    },
}

/// Source of buffered input events.
///
/// Implementations are shared between the thread that produces events (a UI
/// or windowing thread) and the render thread that polls them at each frame
/// tick, so both methods take `&self`.
pub trait InputSource: Send + Sync + 'static {
    /// Whether at least one event is buffered.
    fn buffered_events_pending(&self) -> bool;

    /// Remove and return every buffered event, oldest first.
    fn drain_events(&self) -> Vec<InputEvent>;
}
