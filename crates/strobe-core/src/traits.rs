//! Collaborator traits the scheduling core calls through on the render thread.

use crate::id::FrameId;

/// Adapter over a UI toolkit's exclusive lock.
///
/// Some UI toolkits hold a global lock while their own thread runs. If the
/// render thread also holds it for the whole commit phase, a UI thread that
/// blocks on the lock inside a unit's commit path deadlocks. The commit
/// sequencer therefore releases the lock around commits of units flagged
/// `swing_safe`, and reacquires it afterwards.
///
/// Platforms without such a lock use [`NoExternalLock`].
pub trait ExternalLock: Send + Sync {
    /// Whether the calling thread currently holds the lock.
    fn is_held(&self) -> bool;

    /// Release the lock held by the calling thread.
    fn release(&self);

    /// Reacquire the lock released by [`release`](ExternalLock::release).
    fn reacquire(&self);
}

/// An [`ExternalLock`] that is never held.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoExternalLock;

impl ExternalLock for NoExternalLock {
    fn is_held(&self) -> bool {
        false
    }

    fn release(&self) {}

    fn reacquire(&self) {}
}

/// The scene renderer driven by the render thread.
///
/// `render` draws the scene state produced by the commits of earlier
/// frames. It is called once per render-loop iteration, before that
/// iteration's commits.
pub trait RenderTarget: Send + 'static {
    /// Draw one update.
    fn render(&mut self, frame: FrameId);
}
