//! Deferred error queue
//!
//! Fixed-capacity ring of driver error codes captured by the engine's own
//! polling. Each client owns one queue; the producer (its wrapped calls) and
//! the consumer (its own error-poll call) run on the client's thread.
//!
//! A full queue drops the newest code. The ring never grows and never
//! blocks.

use crate::error::Result;

/// Default number of pending codes per client
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Ring buffer of pending error codes
#[derive(Debug, Clone)]
pub struct DeferredErrorQueue {
    /// One slot more than the usable capacity so `read == write` means empty
    slots: Box<[u32]>,
    read: usize,
    write: usize,
    dropped: u64,
}

impl DeferredErrorQueue {
    /// Create a queue holding up to `capacity` codes
    ///
    /// Fails instead of aborting when the ring cannot be allocated.
    pub fn new(capacity: usize) -> Result<Self> {
        let len = capacity.saturating_add(1);
        let mut slots = Vec::new();
        slots.try_reserve_exact(len)?;
        slots.resize(len, 0);

        Ok(Self {
            slots: slots.into_boxed_slice(),
            read: 0,
            write: 0,
            dropped: 0,
        })
    }

    fn next(&self, cursor: usize) -> usize {
        (cursor + 1) % self.slots.len()
    }

    /// Queue a code; returns `false` (and drops it) when the queue is full
    pub fn push(&mut self, code: u32) -> bool {
        let next = self.next(self.write);
        if next == self.read {
            self.dropped += 1;
            log::warn!(
                "Deferred error queue full ({} codes), dropping error {:#x}",
                self.capacity(),
                code
            );
            return false;
        }

        self.slots[self.write] = code;
        self.write = next;
        true
    }

    /// Take the oldest pending code
    pub fn pop(&mut self) -> Option<u32> {
        if self.read == self.write {
            return None;
        }

        let code = self.slots[self.read];
        self.read = self.next(self.read);
        Some(code)
    }

    /// Number of pending codes
    pub fn len(&self) -> usize {
        (self.write + self.slots.len() - self.read) % self.slots.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// Usable capacity
    pub fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    /// Codes dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = DeferredErrorQueue::new(4).unwrap();
        assert!(queue.push(0x500));
        assert!(queue.push(0x501));
        assert!(queue.push(0x502));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(0x500));
        assert_eq!(queue.pop(), Some(0x501));
        assert_eq!(queue.pop(), Some(0x502));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_overflow_drops_newest() {
        let capacity = 4;
        let mut queue = DeferredErrorQueue::new(capacity).unwrap();
        for code in 0..capacity as u32 {
            assert!(queue.push(code));
        }
        assert!(!queue.push(99));
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.len(), capacity);

        for code in 0..capacity as u32 {
            assert_eq!(queue.pop(), Some(code));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_empty_keeps_cursors() {
        let mut queue = DeferredErrorQueue::new(2).unwrap();
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.pop(), None);
        assert!(queue.push(7));
        assert_eq!(queue.pop(), Some(7));
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_wraparound() {
        let mut queue = DeferredErrorQueue::new(3).unwrap();
        for round in 0..10u32 {
            assert!(queue.push(round));
            assert!(queue.push(round + 100));
            assert_eq!(queue.pop(), Some(round));
            assert_eq!(queue.pop(), Some(round + 100));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_default_capacity() {
        let queue = DeferredErrorQueue::new(DEFAULT_QUEUE_CAPACITY).unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_unallocatable_capacity_fails() {
        let err = DeferredErrorQueue::new(usize::MAX / 2).unwrap_err();
        assert!(matches!(err, crate::error::SnoopError::Allocation(_)));
    }
}
