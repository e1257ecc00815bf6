//! Root-first hash-trie reader.

use std::io::{self, Read, Seek, SeekFrom};

use bytes::Bytes;
use tracing::trace;
use weft_primitives::{ContentChunk, SwarmAddress, BRANCHES, CHUNK_SIZE, SEGMENT_SIZE};
use weft_storage::{ModeGet, Storer};

use crate::pipeline::FileError;

/// A position-addressable reader over the hash-trie rooted at a file
/// reference.
///
/// The joiner walks the trie depth first, left to right, translating byte
/// offsets into a per-level cursor descent and fetching the covering leaf
/// on demand. Fetches are sequential per reader; independent readers share
/// nothing.
#[derive(Debug)]
pub struct Joiner<S> {
    storer: S,
    /// total byte length, from the root chunk's span
    length: u64,
    root_payload: Bytes,
    root_level: usize,
    offset: u64,
    current: Option<LeafWindow>,
}

#[derive(Debug)]
struct LeafWindow {
    start: u64,
    payload: Bytes,
}

impl<S: Storer> Joiner<S> {
    /// Opens the trie rooted at `address`. The returned joiner knows the
    /// total file length; see [`Joiner::size`].
    pub fn new(storer: S, address: &SwarmAddress) -> Result<Self, FileError> {
        let root = storer.get(ModeGet::Request, address)?;
        let content = ContentChunk::from_chunk_bytes(root.data())?;
        let length = content.span();
        let root_level = levels_for_length(length);
        trace!(%address, length, root_level, "joiner opened");

        Ok(Self {
            storer,
            length,
            root_payload: content.payload().clone(),
            root_level,
            offset: 0,
            current: None,
        })
    }

    /// The total byte length of the joined file.
    pub fn size(&self) -> u64 {
        self.length
    }

    /// Descends from the root to the leaf covering `target`, re-deriving
    /// each subtree's depth from its own span so dangling subtrees resolve
    /// without wrapper chunks.
    fn leaf_at(&self, target: u64) -> Result<LeafWindow, FileError> {
        let mut payload = self.root_payload.clone();
        let mut level = self.root_level;
        let mut start = 0u64;
        let mut off = target;

        while level > 1 {
            let child_capacity = capacity(level - 1);
            let index = (off / child_capacity) as usize;
            let ref_at = index * SEGMENT_SIZE;
            if ref_at + SEGMENT_SIZE > payload.len() {
                return Err(FileError::InconsistentRefs);
            }

            let child_address = SwarmAddress::from_slice(&payload[ref_at..ref_at + SEGMENT_SIZE]);
            let child = self.storer.get(ModeGet::Request, &child_address)?;
            let content = ContentChunk::from_chunk_bytes(child.data())?;

            start += index as u64 * child_capacity;
            off -= index as u64 * child_capacity;
            level = levels_for_length(content.span());
            payload = content.payload().clone();
        }

        Ok(LeafWindow { start, payload })
    }
}

impl<S: Storer> Read for Joiner<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.offset >= self.length || buf.is_empty() {
            return Ok(0);
        }

        let covered = self.current.as_ref().is_some_and(|leaf| {
            self.offset >= leaf.start && self.offset < leaf.start + leaf.payload.len() as u64
        });
        if !covered {
            let leaf = self
                .leaf_at(self.offset)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            self.current = Some(leaf);
        }
        let Some(leaf) = self.current.as_ref() else {
            return Ok(0);
        };
        let within = (self.offset - leaf.start) as usize;
        let n = buf
            .len()
            .min(leaf.payload.len() - within)
            .min((self.length - self.offset) as usize);
        buf[..n].copy_from_slice(&leaf.payload[within..within + n]);
        self.offset += n as u64;
        Ok(n)
    }
}

impl<S: Storer> Seek for Joiner<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::Current(d) => self.offset as i128 + d as i128,
            SeekFrom::End(d) => self.length as i128 + d as i128,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start",
            ));
        }
        self.offset = (target as u64).min(self.length);
        Ok(self.offset)
    }
}

/// The trie depth a file of `length` bytes occupies; 1 is a single leaf.
fn levels_for_length(length: u64) -> usize {
    let mut level = 1;
    let mut cap = CHUNK_SIZE as u64;
    while cap < length {
        cap *= BRANCHES as u64;
        level += 1;
    }
    level
}

/// Bytes covered by a full subtree rooted at `level`.
fn capacity(level: usize) -> u64 {
    CHUNK_SIZE as u64 * (BRANCHES as u64).pow(level as u32 - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{new_pipeline, Pipeline};
    use rand::{rngs::StdRng, RngCore, SeedableRng};
    use weft_primitives::bmt::Pool;
    use weft_storage::{MemStorer, ModePut};

    fn split(data: &[u8]) -> (MemStorer, SwarmAddress) {
        let store = MemStorer::new(SwarmAddress::ZERO);
        let mut pipeline = new_pipeline(store.clone(), ModePut::Upload, Pool::new(8));
        pipeline.write(data).unwrap();
        let reference = pipeline.sum().unwrap();
        let address = SwarmAddress::from_slice(&reference);
        (store, address)
    }

    fn join_all(store: &MemStorer, address: &SwarmAddress) -> Vec<u8> {
        let mut joiner = Joiner::new(store.clone(), address).unwrap();
        let mut out = Vec::new();
        joiner.read_to_end(&mut out).unwrap();
        out
    }

    fn rand_bytes(len: usize, seed: u64) -> Vec<u8> {
        let mut data = vec![0u8; len];
        StdRng::seed_from_u64(seed).fill_bytes(&mut data);
        data
    }

    #[test]
    fn test_join_split_roundtrip() {
        // one case per trie shape: empty, short leaf, exact chunk,
        // chunk + 1, several chunks, exactly one full inner node, and a
        // dangling-subtree shape
        let lengths = [
            0,
            10,
            CHUNK_SIZE,
            CHUNK_SIZE + 1,
            3 * CHUNK_SIZE + 100,
            BRANCHES * CHUNK_SIZE,
            BRANCHES * CHUNK_SIZE + 1,
        ];

        for (i, len) in lengths.into_iter().enumerate() {
            let data = rand_bytes(len, i as u64);
            let (store, address) = split(&data);

            let joiner = Joiner::new(store.clone(), &address).unwrap();
            assert_eq!(joiner.size(), len as u64, "length {len}");
            assert_eq!(join_all(&store, &address), data, "length {len}");
        }
    }

    #[test]
    fn test_prefix_read() {
        let data = rand_bytes(2 * CHUNK_SIZE + 57, 42);
        let (store, address) = split(&data);

        let mut joiner = Joiner::new(store, &address).unwrap();
        let mut prefix = vec![0u8; 1000];
        joiner.read_exact(&mut prefix).unwrap();
        assert_eq!(prefix, data[..1000]);
    }

    #[test]
    fn test_seek_and_read() {
        let data = rand_bytes(3 * CHUNK_SIZE + 11, 7);
        let (store, address) = split(&data);
        let mut joiner = Joiner::new(store, &address).unwrap();

        // land mid-way into the second leaf
        let at = CHUNK_SIZE as u64 + 100;
        assert_eq!(joiner.seek(SeekFrom::Start(at)).unwrap(), at);
        let mut buf = vec![0u8; CHUNK_SIZE];
        joiner.read_exact(&mut buf).unwrap();
        assert_eq!(buf, data[at as usize..at as usize + CHUNK_SIZE]);

        // relative and end-anchored seeks
        assert_eq!(
            joiner.seek(SeekFrom::End(-10)).unwrap(),
            data.len() as u64 - 10
        );
        let mut tail = Vec::new();
        joiner.read_to_end(&mut tail).unwrap();
        assert_eq!(tail, data[data.len() - 10..]);
    }

    #[test]
    fn test_seek_past_end_reads_nothing() {
        let data = rand_bytes(100, 3);
        let (store, address) = split(&data);
        let mut joiner = Joiner::new(store, &address).unwrap();

        joiner.seek(SeekFrom::Start(10_000)).unwrap();
        let mut out = Vec::new();
        assert_eq!(joiner.read_to_end(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_missing_root() {
        let store = MemStorer::new(SwarmAddress::ZERO);
        assert!(matches!(
            Joiner::new(store, &SwarmAddress::repeat_byte(0x0c)),
            Err(FileError::Storage(_))
        ));
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(16))]
        #[test]
        fn test_roundtrip_random_lengths(len in 0usize..2 * CHUNK_SIZE, seed in proptest::prelude::any::<u64>()) {
            let data = rand_bytes(len, seed);
            let (store, address) = split(&data);
            proptest::prop_assert_eq!(join_all(&store, &address), data);
        }
    }

    #[test]
    fn test_independent_readers() {
        let data = rand_bytes(2 * CHUNK_SIZE, 9);
        let (store, address) = split(&data);

        let mut a = Joiner::new(store.clone(), &address).unwrap();
        let mut b = Joiner::new(store.clone(), &address).unwrap();

        let mut buf_a = vec![0u8; 100];
        a.read_exact(&mut buf_a).unwrap();
        b.seek(SeekFrom::Start(CHUNK_SIZE as u64)).unwrap();
        let mut buf_b = vec![0u8; 100];
        b.read_exact(&mut buf_b).unwrap();

        assert_eq!(buf_a, data[..100]);
        assert_eq!(buf_b, data[CHUNK_SIZE..CHUNK_SIZE + 100]);
    }
}
