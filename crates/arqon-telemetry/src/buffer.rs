use std::collections::VecDeque;

use crate::event::TelemetryEvent;

/// A fixed-capacity FIFO that drops the oldest entry on overflow rather
/// than blocking the caller or growing without bound.
pub struct RingBuffer {
    capacity: usize,
    items: VecDeque<TelemetryEvent>,
    dropped: u64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), items: VecDeque::with_capacity(capacity.max(1)), dropped: 0 }
    }

    /// Pushes an event, evicting the oldest one first if the buffer is
    /// already at capacity. Returns `true` if an eviction occurred.
    pub fn push(&mut self, event: TelemetryEvent) -> bool {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front();
            self.dropped += 1;
            true
        } else {
            false
        };
        self.items.push_back(event);
        evicted
    }

    pub fn drain(&mut self) -> Vec<TelemetryEvent> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventType, Severity};

    fn event() -> TelemetryEvent {
        TelemetryEvent::new(EventType::SystemInfo, Severity::Info)
    }

    #[test]
    fn push_under_capacity_does_not_evict() {
        let mut buf = RingBuffer::new(3);
        assert!(!buf.push(event()));
        assert!(!buf.push(event()));
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.dropped(), 0);
    }

    #[test]
    fn push_over_capacity_drops_oldest() {
        let mut buf = RingBuffer::new(2);
        let first = event();
        let first_id = first.event_id.clone();
        buf.push(first);
        buf.push(event());
        assert!(buf.push(event()));
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.dropped(), 1);

        let remaining = buf.drain();
        assert!(remaining.iter().all(|e| e.event_id != first_id));
    }

    #[test]
    fn drain_empties_buffer() {
        let mut buf = RingBuffer::new(4);
        buf.push(event());
        buf.push(event());
        let drained = buf.drain();
        assert_eq!(drained.len(), 2);
        assert!(buf.is_empty());
    }
}
