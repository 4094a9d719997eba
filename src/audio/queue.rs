//! Bounded FIFO of captured sample blocks.
//!
//! The capture thread pushes, the consumer loop pops.  When the queue is full
//! a push **evicts the oldest** block instead of blocking, so a slow consumer
//! loses stale audio rather than stalling the device.
//!
//! ```rust
//! use sound_trigger::audio::{BlockQueue, SampleBlock};
//!
//! let queue = BlockQueue::new(2);
//! queue.push(SampleBlock::new(0, vec![1]));
//! queue.push(SampleBlock::new(1, vec![2]));
//! queue.push(SampleBlock::new(2, vec![3])); // evicts block 0
//!
//! assert_eq!(queue.pop().map(|b| b.sequence), Some(1));
//! assert_eq!(queue.evicted(), 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_queue::ArrayQueue;

// ---------------------------------------------------------------------------
// SampleBlock
// ---------------------------------------------------------------------------

/// One capture read: `chunk_size` mono i16 PCM samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBlock {
    /// Position of this block in the capture stream, starting at 0.
    pub sequence: u64,
    /// Raw signed 16-bit samples.
    pub samples: Vec<i16>,
}

impl SampleBlock {
    pub fn new(sequence: u64, samples: Vec<i16>) -> Self {
        Self { sequence, samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ---------------------------------------------------------------------------
// BlockQueue
// ---------------------------------------------------------------------------

/// Lock-free bounded queue with drop-oldest overflow.
///
/// Shared between exactly one producer and one consumer behind an `Arc`.
pub struct BlockQueue {
    inner: ArrayQueue<SampleBlock>,
    evicted: AtomicU64,
}

impl BlockQueue {
    /// Create a queue holding at most `capacity` blocks.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "BlockQueue capacity must be > 0");
        Self {
            inner: ArrayQueue::new(capacity),
            evicted: AtomicU64::new(0),
        }
    }

    /// Append `block`; never blocks.  Returns the evicted block, if any.
    pub fn push(&self, block: SampleBlock) -> Option<SampleBlock> {
        let evicted = self.inner.force_push(block);
        if let Some(old) = &evicted {
            let total = self.evicted.fetch_add(1, Ordering::Relaxed) + 1;
            log::debug!(
                "capture queue full, dropped block #{} ({total} dropped so far)",
                old.sequence
            );
        }
        evicted
    }

    /// Remove the oldest block.
    pub fn pop(&self) -> Option<SampleBlock> {
        self.inner.pop()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Total number of blocks dropped on overflow since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
