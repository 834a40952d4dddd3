//! Fixed-size block accumulator for captured samples.
//!
//! Device callbacks deliver buffers of whatever size the hardware prefers;
//! the capture pipeline emits blocks of exactly `block_size` samples. Leftover
//! samples are carried into the next push, so no sample is lost or
//! duplicated across block boundaries.
//!
//! # Example
//!
//! ```rust
//! use extruder_voice::audio::BlockAccumulator;
//!
//! let mut acc = BlockAccumulator::new(4);
//! assert!(acc.push_slice(&[1.0, 2.0, 3.0]).is_empty());
//! let blocks = acc.push_slice(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
//! assert_eq!(blocks, vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]);
//! assert_eq!(acc.len(), 1);
//! ```

// ---------------------------------------------------------------------------
// BlockAccumulator
// ---------------------------------------------------------------------------

/// Splits a continuous sample stream into fixed-size blocks.
pub struct BlockAccumulator<T> {
    pending: Vec<T>,
    block_size: usize,
}

impl<T: Copy> BlockAccumulator<T> {
    /// Create an accumulator emitting blocks of `block_size` samples.
    ///
    /// # Panics
    ///
    /// Panics if `block_size == 0`.
    pub fn new(block_size: usize) -> Self {
        assert!(block_size > 0, "BlockAccumulator block size must be > 0");
        Self {
            pending: Vec::with_capacity(block_size),
            block_size,
        }
    }

    /// Append `data` and return every block completed by it, oldest first.
    pub fn push_slice(&mut self, data: &[T]) -> Vec<Vec<T>> {
        let mut blocks = Vec::new();
        let mut rest = data;

        while !rest.is_empty() {
            let room = self.block_size - self.pending.len();
            let take = room.min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.block_size {
                let full = std::mem::replace(&mut self.pending, Vec::with_capacity(self.block_size));
                blocks.push(full);
            }
        }

        blocks
    }

    /// Discard any partial block.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Number of samples waiting for the next block.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
