//! File layer: the streaming splitter pipeline and the hash-trie joiner.
//!
//! Uploading slices a byte stream into content-addressed chunks and
//! assembles their references into a balanced hash-trie whose root is the
//! file reference; downloading walks the trie back into bytes.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod pipeline;
pub use pipeline::{new_pipeline, ChainWriter, FileError, PipeWriteArgs, Pipeline};

mod joiner;
pub use joiner::Joiner;
