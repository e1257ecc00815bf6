use alloy_primitives::keccak256;

use crate::SEGMENT_SIZE;

/// The non-optimised, easy-to-audit reference implementation of the BMT
/// section hash. Used to cross-check [`super::Hasher`] in tests.
#[derive(Debug)]
pub struct RefHasher<const N: usize> {
    /// c * segment_size, where c = 2 ^ ceil(log2(N))
    max_data_length: usize,
    /// 2 * segment_size
    segment_pair_length: usize,
}

impl<const N: usize> Default for RefHasher<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RefHasher<N> {
    pub fn new() -> Self {
        let mut c = 2;
        while c < N {
            c *= 2;
        }

        Self {
            segment_pair_length: 2 * SEGMENT_SIZE,
            max_data_length: c * SEGMENT_SIZE,
        }
    }

    /// Returns the BMT root of the byte slice, without the span metahash.
    pub fn hash(&self, data: &[u8]) -> [u8; 32] {
        // zero-pad short input to the full base layer
        let mut d = vec![0u8; self.max_data_length];
        let len = data.len().min(self.max_data_length);
        d[..len].copy_from_slice(&data[..len]);

        self.hash_helper(&d, self.max_data_length)
    }

    /// Recurses on both halves of the slice and hashes the concatenated
    /// results; a segment pair is hashed directly.
    fn hash_helper(&self, data: &[u8], length: usize) -> [u8; 32] {
        let mut pair = [0u8; 2 * SEGMENT_SIZE];

        if length == self.segment_pair_length {
            pair.copy_from_slice(data);
        } else {
            let half = length / 2;
            pair[..SEGMENT_SIZE].copy_from_slice(&self.hash_helper(&data[..half], half));
            pair[SEGMENT_SIZE..].copy_from_slice(&self.hash_helper(&data[half..], half));
        };
        *keccak256(pair)
    }
}
