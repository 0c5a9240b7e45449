//! Reusable output buffer for decoded pixels

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counts scratch allocations. Clones share the same count.
#[derive(Debug, Clone, Default)]
pub struct AllocationCounter(Arc<AtomicU64>);

impl AllocationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of allocations recorded so far.
    pub fn count(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn record(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// Owned pixel storage reused across decodes.
///
/// The allocation only grows: a frame that fits in the current capacity is
/// written in place, a larger one replaces the allocation exactly once.
#[derive(Debug)]
pub struct ScratchBuffer {
    data: Vec<u8>,
    /// Bytes holding the current frame; 0 when no valid frame is stored
    len: usize,
    counter: AllocationCounter,
}

impl ScratchBuffer {
    /// Create an empty scratch buffer. No memory is allocated until the
    /// first [`Self::prepare`].
    pub fn new(counter: AllocationCounter) -> Self {
        Self {
            data: Vec::new(),
            len: 0,
            counter,
        }
    }

    /// Bytes available without reallocating.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes of the current frame.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Make room for `required` bytes and return them for writing.
    pub fn prepare(&mut self, required: usize) -> &mut [u8] {
        if self.data.len() < required {
            tracing::debug!(
                "Growing scratch buffer from {} to {} bytes",
                self.data.len(),
                required
            );
            self.data = vec![0; required];
            self.counter.record();
        }
        self.len = required;
        &mut self.data[..required]
    }

    /// Mark the contents as no longer holding a frame. Keeps the allocation.
    pub fn invalidate(&mut self) {
        self.len = 0;
    }

    /// The current frame's bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_scratch_does_not_allocate() {
        let counter = AllocationCounter::new();
        let scratch = ScratchBuffer::new(counter.clone());
        assert_eq!(scratch.capacity(), 0);
        assert!(scratch.is_empty());
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn test_reuse_when_large_enough() {
        let counter = AllocationCounter::new();
        let mut scratch = ScratchBuffer::new(counter.clone());

        scratch.prepare(64);
        assert_eq!(counter.count(), 1);

        scratch.prepare(64);
        scratch.prepare(16);
        assert_eq!(counter.count(), 1);
        assert_eq!(scratch.len(), 16);
        assert_eq!(scratch.capacity(), 64);
    }

    #[test]
    fn test_undersized_reallocates_once() {
        let counter = AllocationCounter::new();
        let mut scratch = ScratchBuffer::new(counter.clone());

        scratch.prepare(16);
        scratch.prepare(256);
        assert_eq!(counter.count(), 2);
        assert_eq!(scratch.capacity(), 256);
    }

    #[test]
    fn test_invalidate_keeps_capacity() {
        let mut scratch = ScratchBuffer::new(AllocationCounter::new());
        scratch.prepare(32);
        scratch.invalidate();
        assert!(scratch.pixels().is_empty());
        assert_eq!(scratch.capacity(), 32);
    }
}
