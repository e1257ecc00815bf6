use alloy_primitives::{Address, Keccak256, PrimitiveSignature, B256};
use alloy_signer::Signer;
use bytes::{Bytes, BytesMut};

use super::{Chunk, ChunkError, ContentChunk};
use crate::SwarmAddress;

const ID_SIZE: usize = 32;

/// Size of the secp256k1 signature carried by a single-owner chunk.
pub const SOC_SIGNATURE_SIZE: usize = 65;

const SOC_HEADER_SIZE: usize = ID_SIZE + SOC_SIGNATURE_SIZE;

/// A single-owner chunk: a content chunk enclosed under a user-chosen id,
/// authenticated by the owner's signature over
/// `keccak256(id ‖ inner_address)` and addressed by `keccak256(id ‖ owner)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleOwnerChunk {
    id: B256,
    owner: Address,
    signature: PrimitiveSignature,
    inner: ContentChunk,
}

impl SingleOwnerChunk {
    /// Builds and signs a new single-owner chunk enclosing `inner`.
    pub async fn new(
        id: B256,
        inner: ContentChunk,
        signer: impl Signer,
    ) -> Result<Self, ChunkError> {
        let digest = Self::to_sign(&id, &inner.address());
        let signature = signer.sign_hash(&digest).await?;

        Ok(Self {
            id,
            owner: signer.address(),
            signature,
            inner,
        })
    }

    /// Reconstructs a single-owner chunk from its wire form
    /// (`id ‖ signature ‖ inner`), recovering the owner from the signature
    /// and checking it against the claimed address.
    pub fn from_chunk(chunk: &Chunk) -> Result<Self, ChunkError> {
        let data = chunk.data();
        if data.len() < SOC_HEADER_SIZE {
            return Err(ChunkError::Size {
                context: "insufficient data for single-owner header",
                size: data.len(),
                limit: SOC_HEADER_SIZE,
            });
        }

        let id = B256::from_slice(&data[..ID_SIZE]);
        let signature = PrimitiveSignature::try_from(&data[ID_SIZE..SOC_HEADER_SIZE])?;
        let inner = ContentChunk::from_chunk_bytes(&data.slice(SOC_HEADER_SIZE..))?;

        let digest = Self::to_sign(&id, &inner.address());
        let owner = signature.recover_address_from_prehash(&digest)?;

        let soc = Self {
            id,
            owner,
            signature,
            inner,
        };

        let computed = soc.address();
        match computed == *chunk.address() {
            true => Ok(soc),
            false => Err(ChunkError::AddressMismatch {
                claimed: *chunk.address(),
                computed,
            }),
        }
    }

    /// The digest the owner signs.
    fn to_sign(id: &B256, inner_address: &SwarmAddress) -> B256 {
        let mut hasher = Keccak256::new();
        hasher.update(id);
        hasher.update(inner_address);
        hasher.finalize()
    }

    /// The single-owner address, a function of id and owner only.
    pub fn address(&self) -> SwarmAddress {
        let mut hasher = Keccak256::new();
        hasher.update(self.id);
        hasher.update(self.owner);
        hasher.finalize()
    }

    /// Checks the signature against the enclosed content and the claimed
    /// address. Never errors; malformed state is simply invalid.
    pub fn verify(&self, address: &SwarmAddress) -> bool {
        let digest = Self::to_sign(&self.id, &self.inner.address());
        match self.signature.recover_address_from_prehash(&digest) {
            Ok(recovered) => recovered == self.owner && *address == self.address(),
            Err(_) => false,
        }
    }

    pub fn id(&self) -> &B256 {
        &self.id
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn signature(&self) -> &PrimitiveSignature {
        &self.signature
    }

    pub fn inner(&self) -> &ContentChunk {
        &self.inner
    }

    /// Canonical wire bytes: `id ‖ signature ‖ inner`.
    pub fn chunk_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(SOC_HEADER_SIZE + self.inner.size());
        buf.extend_from_slice(self.id.as_slice());
        buf.extend_from_slice(&self.signature.as_bytes());
        buf.extend_from_slice(&self.inner.chunk_bytes());
        buf.freeze()
    }

    /// The chunk with its single-owner address attached.
    pub fn to_chunk(&self) -> Chunk {
        Chunk::new(self.address(), self.chunk_bytes())
    }
}
