//! The canonical chunk layout and its two families.
//!
//! A chunk is an `(address, data)` pair. Content-addressed chunks carry
//! `span(8 LE) ‖ payload(≤ 4096)` and are addressed by their BMT hash;
//! single-owner chunks carry `id(32) ‖ signature(65) ‖ inner` and are
//! addressed by `keccak256(id ‖ owner)`.

use bytes::Bytes;

use crate::SwarmAddress;

mod content;
pub use content::ContentChunk;

mod single_owner;
pub use single_owner::{SingleOwnerChunk, SOC_SIGNATURE_SIZE};

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("{context}: size {size}, limit {limit}")]
    Size {
        context: &'static str,
        size: usize,
        limit: usize,
    },
    #[error("signer error: {0}")]
    Signer(#[from] alloy_signer::Error),
    #[error("signature error: {0}")]
    Signature(#[from] alloy_primitives::SignatureError),
    #[error("address mismatch: claimed {claimed}, computed {computed}")]
    AddressMismatch {
        claimed: SwarmAddress,
        computed: SwarmAddress,
    },
}

/// An atomic stored unit of the swarm: an address and its wire bytes.
///
/// The address is a claim; whether the data backs the claim is decided by
/// the registered [`crate::ChunkValidator`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    address: SwarmAddress,
    data: Bytes,
    tag_id: Option<u32>,
}

impl Chunk {
    pub fn new(address: SwarmAddress, data: impl Into<Bytes>) -> Self {
        Self {
            address,
            data: data.into(),
            tag_id: None,
        }
    }

    /// Associates the chunk with an upload tag.
    pub fn with_tag_id(mut self, tag_id: u32) -> Self {
        self.tag_id = Some(tag_id);
        self
    }

    pub fn address(&self) -> &SwarmAddress {
        &self.address
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn tag_id(&self) -> Option<u32> {
        self.tag_id
    }
}
