//! Commonly used types in weft.
//!
//! This crate contains the chunk model, the BMT content-address function
//! and the address arithmetic the rest of the node is built on.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

/// Size of a hash segment in bytes.
pub const SEGMENT_SIZE: usize = 32;

/// Number of segments in a full chunk section layer.
pub const BRANCHES: usize = 128;

/// Maximum chunk payload size in bytes.
pub const CHUNK_SIZE: usize = SEGMENT_SIZE * BRANCHES;

/// Size of the little-endian span prefix in bytes.
pub const SPAN_SIZE: usize = 8;

/// Maximum proximity order for 256-bit addresses.
pub const MAX_PO: u8 = 31;

/// Extended proximity order used by neighbourhood bookkeeping.
pub const EXTENDED_PO: u8 = MAX_PO + 5;

/// Number of proximity bins (one for each PO value).
pub const MAX_BINS: u8 = MAX_PO + 1;

/// A 32-byte swarm overlay or chunk address.
pub type SwarmAddress = alloy_primitives::B256;

mod distance;
pub use distance::{distance, distance_cmp, Distance};

mod proximity;
pub use proximity::{proximity, Proximity};

pub mod bmt;
pub use bmt::{Hasher, Pool, PooledHasher, RefHasher};

mod chunk;
pub use chunk::{Chunk, ChunkError, ContentChunk, SingleOwnerChunk, SOC_SIGNATURE_SIZE};

mod validator;
pub use validator::{
    CallbackValidator, ChunkValidator, ContentAddressValidator, DeliveryCallback, SocValidator,
    ValidatorSet, ValidatorWithCallback,
};
