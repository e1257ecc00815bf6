//! Binary Merkle Tree hashing over chunk sections.
//!
//! The BMT of a chunk is a fixed-depth balanced keccak tree over the
//! zero-padded section layer ([`BRANCHES`] segments of [`SEGMENT_SIZE`]
//! bytes). The content address is the keccak of the 8-byte little-endian
//! span concatenated with the tree root.

use alloy_primitives::Keccak256;

use crate::{SwarmAddress, CHUNK_SIZE, SEGMENT_SIZE};

mod pool;
pub use pool::{Pool, PooledHasher};

mod reference;
pub use reference::RefHasher;

/// Incremental BMT hasher over a single chunk's worth of data.
///
/// Writes accumulate into an internal buffer; [`Hasher::hash`] folds the
/// buffer pairwise with keccak and finalizes with the span. Instances are
/// reusable via [`Hasher::reset`] and poolable via [`Pool`].
#[derive(Debug)]
pub struct Hasher {
    // Invariant: bytes at and beyond `len` are zero, so the section layer
    // is already zero-padded when `hash` runs.
    buf: Box<[u8; CHUNK_SIZE]>,
    len: usize,
    span: u64,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    pub fn new() -> Self {
        Self {
            buf: Box::new([0u8; CHUNK_SIZE]),
            len: 0,
            span: 0,
        }
    }

    /// Set the span finalized into the root hash, as a little-endian u64.
    pub fn set_span(&mut self, span: u64) {
        self.span = span;
    }

    /// Appends `data` to the buffer, returning how many bytes were
    /// consumed. Writes beyond [`CHUNK_SIZE`] are truncated.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(CHUNK_SIZE - self.len);
        self.buf[self.len..self.len + n].copy_from_slice(&data[..n]);
        self.len += n;
        n
    }

    /// Computes the content address of the written data under the
    /// configured span.
    pub fn hash(&self) -> SwarmAddress {
        let mut level = *self.buf;
        let mut width = CHUNK_SIZE;

        while width > SEGMENT_SIZE {
            let mut i = 0;
            while i < width {
                let mut hasher = Keccak256::new();
                hasher.update(&level[i..i + 2 * SEGMENT_SIZE]);
                let sum = hasher.finalize();
                level[i / 2..i / 2 + SEGMENT_SIZE].copy_from_slice(sum.as_slice());
                i += 2 * SEGMENT_SIZE;
            }
            width /= 2;
        }

        let mut hasher = Keccak256::new();
        hasher.update(self.span.to_le_bytes());
        hasher.update(&level[..SEGMENT_SIZE]);
        hasher.finalize()
    }

    /// Clears buffer and span for reuse.
    pub fn reset(&mut self) {
        self.buf.fill(0);
        self.len = 0;
        self.span = 0;
    }
}

/// Convenience one-shot: the BMT address of `payload` under `span`.
pub fn hash(span: u64, payload: &[u8]) -> SwarmAddress {
    let mut hasher = Hasher::new();
    hasher.set_span(span);
    hasher.write(payload);
    hasher.hash()
}
