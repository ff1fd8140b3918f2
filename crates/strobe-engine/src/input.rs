//! A thread-safe input queue usable as an input-condition source.
//!
//! The windowing or device layer pushes events from its own thread; the
//! scheduler drains the queue at the next frame tick and hands the events
//! to the armed unit.

use std::collections::VecDeque;

use parking_lot::Mutex;
use strobe_core::{InputEvent, InputSource};

/// Buffered [`InputSource`] fed by [`push`](Self::push).
#[derive(Debug, Default)]
pub struct InputBuffer {
    queue: Mutex<VecDeque<InputEvent>>,
    capacity: Option<usize>,
}

impl InputBuffer {
    /// An unbounded buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer that keeps at most `capacity` events, dropping the oldest.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: Some(capacity.max(1)),
        }
    }

    /// Queue an event for the next frame.
    pub fn push(&self, event: InputEvent) {
        let mut queue = self.queue.lock();
        if let Some(capacity) = self.capacity {
            while queue.len() >= capacity {
                queue.pop_front();
                tracing::trace!(capacity, "input buffer full; dropped oldest event");
            }
        }
        queue.push_back(event);
    }

    /// Events currently buffered.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl InputSource for InputBuffer {
    fn buffered_events_pending(&self) -> bool {
        !self.is_empty()
    }

    fn drain_events(&self) -> Vec<InputEvent> {
        self.queue.lock().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_empties_in_order() {
        let buffer = InputBuffer::new();
        assert!(!buffer.buffered_events_pending());
        buffer.push(InputEvent::Custom { code: 1 });
        buffer.push(InputEvent::Custom { code: 2 });
        assert!(buffer.buffered_events_pending());
        assert_eq!(
            buffer.drain_events(),
            vec![InputEvent::Custom { code: 1 }, InputEvent::Custom { code: 2 }]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn bounded_buffer_drops_oldest() {
        let buffer = InputBuffer::with_capacity(2);
        for code in 0..5 {
            buffer.push(InputEvent::Custom { code });
        }
        assert_eq!(buffer.len(), 2);
        assert_eq!(
            buffer.drain_events(),
            vec![InputEvent::Custom { code: 3 }, InputEvent::Custom { code: 4 }]
        );
    }
}
