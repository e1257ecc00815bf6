//! Chunk validators.
//!
//! A chunk is accepted into a store only if some registered validator
//! accepts it. Validators answer with a plain boolean; malformed input of
//! any kind is simply invalid.

use std::sync::Arc;

use crate::{Chunk, ContentChunk, SingleOwnerChunk};

#[auto_impl::auto_impl(&, Arc)]
pub trait ChunkValidator: Send + Sync {
    fn validate(&self, chunk: &Chunk) -> bool;
}

/// Validates that the address of a chunk is the BMT content address of its
/// bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentAddressValidator;

impl ChunkValidator for ContentAddressValidator {
    fn validate(&self, chunk: &Chunk) -> bool {
        match ContentChunk::from_chunk_bytes(chunk.data()) {
            Ok(content) => content.address() == *chunk.address(),
            Err(_) => false,
        }
    }
}

/// Validates single-owner chunks: signature recovery plus address check.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocValidator;

impl ChunkValidator for SocValidator {
    fn validate(&self, chunk: &Chunk) -> bool {
        SingleOwnerChunk::from_chunk(chunk).is_ok()
    }
}

/// A polymorphic set of validators; a chunk is valid iff ANY member
/// accepts it.
#[derive(Clone, Default)]
pub struct ValidatorSet {
    validators: Vec<Arc<dyn ChunkValidator>>,
}

impl std::fmt::Debug for ValidatorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorSet")
            .field("len", &self.validators.len())
            .finish()
    }
}

impl ValidatorSet {
    pub fn new(validators: Vec<Arc<dyn ChunkValidator>>) -> Self {
        Self { validators }
    }

    /// The standard pair: content-address and single-owner validation.
    pub fn standard() -> Self {
        Self::new(vec![
            Arc::new(ContentAddressValidator),
            Arc::new(SocValidator),
        ])
    }
}

impl ChunkValidator for ValidatorSet {
    fn validate(&self, chunk: &Chunk) -> bool {
        self.validators.iter().any(|v| v.validate(chunk))
    }
}

/// Callback fired once a validated chunk has been stored.
pub type DeliveryCallback = Box<dyn FnOnce() + Send + 'static>;

/// Validation that also hands back a post-store delivery callback, as
/// consumed by the push-sync forwarder.
pub trait ValidatorWithCallback: Send + Sync {
    fn validate_with_callback(&self, chunk: &Chunk) -> (bool, Option<DeliveryCallback>);
}

impl ValidatorWithCallback for ValidatorSet {
    fn validate_with_callback(&self, chunk: &Chunk) -> (bool, Option<DeliveryCallback>) {
        (self.validate(chunk), None)
    }
}

/// Wraps a validator with a delivery hook invoked for every valid chunk
/// once it has been stored.
pub struct CallbackValidator<V> {
    inner: V,
    hook: Arc<dyn Fn(Chunk) + Send + Sync>,
}

impl<V: std::fmt::Debug> std::fmt::Debug for CallbackValidator<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackValidator").field("inner", &self.inner).finish()
    }
}

impl<V> CallbackValidator<V> {
    pub fn new(inner: V, hook: Arc<dyn Fn(Chunk) + Send + Sync>) -> Self {
        Self { inner, hook }
    }
}

impl<V: ChunkValidator> ValidatorWithCallback for CallbackValidator<V> {
    fn validate_with_callback(&self, chunk: &Chunk) -> (bool, Option<DeliveryCallback>) {
        match self.inner.validate(chunk) {
            true => {
                let hook = Arc::clone(&self.hook);
                let delivered = chunk.clone();
                (true, Some(Box::new(move || hook(delivered))))
            }
            false => (false, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SwarmAddress;
    use proptest::prelude::*;

    #[test]
    fn test_content_validator() {
        let content = ContentChunk::new(b"hello weft".to_vec()).unwrap();
        let chunk = content.to_chunk();
        assert!(ContentAddressValidator.validate(&chunk));

        let forged = Chunk::new(SwarmAddress::ZERO, chunk.data().clone());
        assert!(!ContentAddressValidator.validate(&forged));
    }

    #[test]
    fn test_soc_rejected_by_content_validator() {
        // arbitrary non-CAC bytes under a random address
        let chunk = Chunk::new(SwarmAddress::repeat_byte(0x77), vec![0u8; 128]);
        assert!(!ContentAddressValidator.validate(&chunk));
        assert!(!SocValidator.validate(&chunk));
    }

    #[test]
    fn test_set_accepts_any() {
        let content = ContentChunk::new(b"abc".to_vec()).unwrap();
        let chunk = content.to_chunk();
        assert!(ValidatorSet::standard().validate(&chunk));
        assert!(!ValidatorSet::default().validate(&chunk));
    }

    proptest! {
        #[test]
        fn test_bit_flip_invalidates(payload in proptest::collection::vec(any::<u8>(), 1..=256), flip in 0usize..256) {
            let content = ContentChunk::new(payload).unwrap();
            let chunk = content.to_chunk();
            prop_assert!(ContentAddressValidator.validate(&chunk));

            let mut data = chunk.data().to_vec();
            let idx = flip % data.len();
            data[idx] ^= 0x01;
            let flipped = Chunk::new(*chunk.address(), data);
            prop_assert!(!ContentAddressValidator.validate(&flipped));
        }
    }
}
