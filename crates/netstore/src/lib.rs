//! Network-backed store facade.
//!
//! Wraps a local [`Storer`] with a [`Retriever`]: a local miss turns into
//! a network retrieval whose result is validated and written back under
//! [`ModePut::Request`], so the store converges toward the chunks the node
//! is asked for.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use std::sync::Arc;

use tracing::{debug, trace};
use weft_primitives::{Chunk, ChunkValidator, SwarmAddress, ValidatorSet};
use weft_retrieval::{Retriever, RetrievalError};
use weft_storage::{ModeGet, ModePut, StorageError, Storer};

#[derive(Debug, thiserror::Error)]
pub enum NetStoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("netstore: retrieve: {0}")]
    Retrieval(#[from] RetrievalError),

    /// Retrieval failed but a recovery attempt was dispatched; the caller
    /// may retry later.
    #[error("netstore: recovery attempt initiated")]
    RecoveryAttempt,
}

/// Hook fired when a chunk cannot be retrieved and recovery targets were
/// supplied with the request.
pub type RecoveryHook = Arc<dyn Fn(SwarmAddress) + Send + Sync>;

/// Opaque recovery targets attached to a retrieval request.
#[derive(Debug, Clone, Default)]
pub struct Targets(pub Vec<Vec<u8>>);

/// A [`Storer`] facade that transparently fetches missing chunks from the
/// overlay.
pub struct NetStore<S, R> {
    local: S,
    retriever: R,
    validators: ValidatorSet,
    recovery: Option<RecoveryHook>,
}

impl<S, R> std::fmt::Debug for NetStore<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetStore")
            .field("recovery", &self.recovery.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: Storer, R: Retriever> NetStore<S, R> {
    pub fn new(local: S, retriever: R, validators: ValidatorSet) -> Self {
        Self {
            local,
            retriever,
            validators,
            recovery: None,
        }
    }

    /// Dispatches `hook` for addresses that fail retrieval while recovery
    /// targets are attached to the request.
    pub fn with_recovery_hook(mut self, hook: RecoveryHook) -> Self {
        self.recovery = Some(hook);
        self
    }

    /// Local store, then the network.
    pub async fn get(&self, mode: ModeGet, address: &SwarmAddress) -> Result<Chunk, NetStoreError> {
        self.get_with_targets(mode, address, None).await
    }

    /// [`NetStore::get`] with recovery targets riding along.
    pub async fn get_with_targets(
        &self,
        mode: ModeGet,
        address: &SwarmAddress,
        targets: Option<&Targets>,
    ) -> Result<Chunk, NetStoreError> {
        match self.local.get(mode, address) {
            Ok(chunk) => return Ok(chunk),
            Err(StorageError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        // a miss with recovery targets attached goes straight to recovery
        if let (Some(hook), Some(_)) = (&self.recovery, targets) {
            let hook = Arc::clone(hook);
            let address = *address;
            tokio::spawn(async move { hook(address) });
            debug!(%address, "local miss, recovery dispatched");
            return Err(NetStoreError::RecoveryAttempt);
        }

        trace!(%address, "local miss, retrieving");
        let data = self.retriever.retrieve(address).await?;

        let chunk = Chunk::new(*address, data);
        if !self.validators.validate(&chunk) {
            return Err(StorageError::InvalidChunk.into());
        }

        self.local.put(ModePut::Request, &[chunk.clone()])?;
        debug!(%address, "retrieved and repopulated");
        Ok(chunk)
    }

    /// Validates every chunk up front, short-circuiting on the first
    /// reject, then delegates to the local store.
    pub fn put(&self, mode: ModePut, chunks: &[Chunk]) -> Result<Vec<bool>, NetStoreError> {
        if chunks.iter().any(|ch| !self.validators.validate(ch)) {
            return Err(StorageError::InvalidChunk.into());
        }
        Ok(self.local.put(mode, chunks)?)
    }

    pub fn local(&self) -> &S {
        &self.local
    }
}
