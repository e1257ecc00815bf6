use std::sync::OnceLock;

use bytes::{BufMut, Bytes, BytesMut};

use super::{Chunk, ChunkError};
use crate::{bmt, SwarmAddress, CHUNK_SIZE, SPAN_SIZE};

/// A content-addressed chunk: `span(8 LE) ‖ payload(≤ 4096)` addressed by
/// its BMT hash.
///
/// The span states how many bytes the subtree rooted at this chunk covers;
/// for leaf chunks that is the payload length, for trie nodes the sum of
/// the children's spans.
#[derive(Debug, Clone)]
pub struct ContentChunk {
    span: u64,
    payload: Bytes,
    // BMT is not free; computed once on first use.
    cached_address: OnceLock<SwarmAddress>,
}

impl PartialEq for ContentChunk {
    fn eq(&self, other: &Self) -> bool {
        self.span == other.span && self.payload == other.payload
    }
}

impl Eq for ContentChunk {}

impl ContentChunk {
    /// Creates a chunk whose span equals the payload length.
    pub fn new(payload: impl Into<Bytes>) -> Result<Self, ChunkError> {
        let payload = payload.into();
        Self::new_with_span(payload.len() as u64, payload)
    }

    /// Creates a chunk with an explicit span, as used by trie nodes.
    pub fn new_with_span(span: u64, payload: impl Into<Bytes>) -> Result<Self, ChunkError> {
        let payload = payload.into();
        if payload.len() > CHUNK_SIZE {
            return Err(ChunkError::Size {
                context: "payload exceeds maximum chunk size",
                size: payload.len(),
                limit: CHUNK_SIZE,
            });
        }

        Ok(Self {
            span,
            payload,
            cached_address: OnceLock::new(),
        })
    }

    /// Parses canonical chunk bytes (`span ‖ payload`).
    pub fn from_chunk_bytes(data: &Bytes) -> Result<Self, ChunkError> {
        if data.len() < SPAN_SIZE {
            return Err(ChunkError::Size {
                context: "insufficient data for span",
                size: data.len(),
                limit: SPAN_SIZE,
            });
        }

        let span = u64::from_le_bytes(data[..SPAN_SIZE].try_into().expect("span is 8 bytes"));
        Self::new_with_span(span, data.slice(SPAN_SIZE..))
    }

    pub fn span(&self) -> u64 {
        self.span
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Total canonical size: span prefix plus payload.
    pub fn size(&self) -> usize {
        SPAN_SIZE + self.payload.len()
    }

    /// The BMT content address of this chunk.
    pub fn address(&self) -> SwarmAddress {
        *self
            .cached_address
            .get_or_init(|| bmt::hash(self.span, &self.payload))
    }

    /// Canonical wire bytes.
    pub fn chunk_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size());
        buf.put_u64_le(self.span);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// The chunk with its claimed address attached.
    pub fn to_chunk(&self) -> Chunk {
        Chunk::new(self.address(), self.chunk_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_creation() {
        let chunk = ContentChunk::new(vec![1, 2, 3, 4, 5]).unwrap();
        assert_eq!(chunk.span(), 5);
        assert_eq!(chunk.size(), SPAN_SIZE + 5);
    }

    #[test]
    fn test_from_bytes() {
        let mut input = Vec::new();
        input.extend_from_slice(&5u64.to_le_bytes());
        input.extend_from_slice(&[1, 2, 3, 4, 5]);

        let chunk = ContentChunk::from_chunk_bytes(&Bytes::from(input)).unwrap();
        assert_eq!(chunk.span(), 5);
        assert_eq!(chunk.payload().as_ref(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_oversize_rejected() {
        assert!(matches!(
            ContentChunk::new(vec![0; CHUNK_SIZE + 1]),
            Err(ChunkError::Size { .. })
        ));
        assert!(matches!(
            ContentChunk::from_chunk_bytes(&Bytes::from(vec![0; CHUNK_SIZE + SPAN_SIZE + 1])),
            Err(ChunkError::Size { .. })
        ));
    }

    #[test]
    fn test_truncated_rejected() {
        assert!(matches!(
            ContentChunk::from_chunk_bytes(&Bytes::from(vec![0; SPAN_SIZE - 1])),
            Err(ChunkError::Size { .. })
        ));
    }

    proptest! {
        #[test]
        fn test_roundtrip(span in 0..=u64::MAX, payload in proptest::collection::vec(any::<u8>(), 0..=CHUNK_SIZE)) {
            let chunk = ContentChunk::new_with_span(span, payload).unwrap();
            let decoded = ContentChunk::from_chunk_bytes(&chunk.chunk_bytes()).unwrap();
            prop_assert_eq!(&chunk, &decoded);
            prop_assert_eq!(chunk.address(), decoded.address());
        }

        #[test]
        fn test_address_depends_on_content(payload in proptest::collection::vec(any::<u8>(), 1..=64)) {
            let chunk = ContentChunk::new(payload.clone()).unwrap();

            let mut flipped = payload;
            flipped[0] ^= 0x01;
            let other = ContentChunk::new(flipped).unwrap();

            prop_assert_ne!(chunk.address(), other.address());
        }
    }
}
