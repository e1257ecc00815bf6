//! The streaming splitter pipeline.
//!
//! A pipeline is a chain of single-entry stages: the chunk feeder slices
//! the byte stream and prepends spans, the BMT writer attaches content
//! addresses, the store writer persists, and the hash-trie writer folds
//! references into the balanced trie whose root is the file reference.
//!
//! Stages hand each other a [`PipeWriteArgs`] record and mutate it in
//! place, so the trie writer can observe the reference its short pipeline
//! produced.

use std::sync::Arc;

use weft_primitives::{bmt::Pool, ChunkError, BRANCHES, CHUNK_SIZE, SEGMENT_SIZE};
use weft_storage::{ModePut, StorageError, Storer};

mod feeder;
pub use feeder::ChunkFeeder;

mod bmt_writer;
pub use bmt_writer::BmtWriter;

mod store_writer;
pub use store_writer::StoreWriter;

mod hashtrie;
pub use hashtrie::{HashTrieWriter, PipelineFn, MAX_TRIE_LEVELS};

#[derive(Debug, thiserror::Error)]
pub enum FileError {
    /// A stage received data too short to carry a span prefix.
    #[error("file: invalid data length {0}")]
    InvalidData(usize),

    /// Reference records do not align to the span + reference stride.
    #[error("file: inconsistent references")]
    InconsistentRefs,

    /// The hash-trie cannot grow past its maximum level. Non-retryable.
    #[error("file: trie full")]
    TrieFull,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),
}

/// The record passed down a writer chain.
#[derive(Debug, Default, Clone)]
pub struct PipeWriteArgs {
    /// Content address, attached by the BMT writer.
    pub reference: Vec<u8>,
    /// The 8-byte little-endian span of `data`'s payload.
    pub span: Vec<u8>,
    /// Canonical chunk bytes: `span ‖ payload`.
    pub data: Vec<u8>,
}

/// A non-initial pipeline stage.
pub trait ChainWriter: Send {
    fn chain_write(&mut self, args: &mut PipeWriteArgs) -> Result<(), FileError>;

    /// Flushes pending state and returns the root reference.
    fn sum(&mut self) -> Result<Vec<u8>, FileError>;
}

/// The caller-facing entry of a composed pipeline.
pub trait Pipeline: Send {
    fn write(&mut self, data: &[u8]) -> Result<usize, FileError>;

    /// Finalizes the stream and returns the file reference.
    fn sum(&mut self) -> Result<Vec<u8>, FileError>;
}

/// Composes the standard upload pipeline:
/// feeder -> BMT -> store -> hash-trie, with the trie wrapping levels
/// through fresh BMT -> store short pipelines.
pub fn new_pipeline<S>(storer: S, mode: ModePut, pool: Arc<Pool>) -> impl Pipeline
where
    S: Storer + Clone + 'static,
{
    let trie_storer = storer.clone();
    let trie_pool = Arc::clone(&pool);
    let pipeline_fn: PipelineFn = Box::new(move || {
        let tail = StoreWriter::<_, HashTrieWriter>::tail(trie_storer.clone(), mode);
        Box::new(BmtWriter::new(Arc::clone(&trie_pool), tail))
    });

    let trie = HashTrieWriter::new(CHUNK_SIZE, BRANCHES, SEGMENT_SIZE, pipeline_fn);
    let store = StoreWriter::new(storer, mode, trie);
    let bmt = BmtWriter::new(pool, store);
    ChunkFeeder::new(CHUNK_SIZE, bmt)
}
