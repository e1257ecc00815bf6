//! Local chunk storage for the weft swarm node.
//!
//! The [`Storer`] trait is the mode-qualified store contract the file
//! pipeline, netstore and push-sync are built against; [`MemStorer`] is the
//! in-memory reference implementation.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use weft_primitives::{Chunk, SwarmAddress};

mod error;
pub use error::{Result, StorageError};

mod mode;
pub use mode::{ModeGet, ModePut, ModeSet};

mod memory;
pub use memory::MemStorer;

mod tags;
pub use tags::{Tag, TagState, Tags};

/// A chunk address paired with its per-bin sequence number, as delivered to
/// pull subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub address: SwarmAddress,
    pub bin_id: u64,
}

/// A pinned address and its pin counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinInfo {
    pub address: SwarmAddress,
    pub pin_counter: u64,
}

/// An active pull subscription: an ordered stream of [`Descriptor`]s and a
/// cancellation handle.
#[derive(Debug)]
pub struct PullSubscription {
    receiver: mpsc::UnboundedReceiver<Descriptor>,
    token: CancellationToken,
}

impl PullSubscription {
    pub(crate) fn new(
        receiver: mpsc::UnboundedReceiver<Descriptor>,
        token: CancellationToken,
    ) -> Self {
        Self { receiver, token }
    }

    /// Receives the next descriptor; `None` once the subscription drained a
    /// bounded interval, was cancelled, or the store closed.
    pub async fn recv(&mut self) -> Option<Descriptor> {
        self.receiver.recv().await
    }

    /// Cancels the subscription. Idempotent; the stream closes promptly.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// Mode-qualified chunk storage.
///
/// All mutating operations serialize under the store's write lock;
/// `has`/`get` take the reader side.
#[auto_impl::auto_impl(&, Arc)]
pub trait Storer: Send + Sync {
    /// Persists chunks, returning prior existence per chunk.
    ///
    /// If a registered validator set rejects any chunk the whole call fails
    /// with [`StorageError::InvalidChunk`] and nothing is stored. Novel
    /// chunks are assigned the next monotonic id of their proximity bin.
    fn put(&self, mode: ModePut, chunks: &[Chunk]) -> Result<Vec<bool>>;

    /// Fetches a chunk. The mode is an access hint only; it does not change
    /// return semantics.
    fn get(&self, mode: ModeGet, address: &SwarmAddress) -> Result<Chunk>;

    fn has(&self, address: &SwarmAddress) -> Result<bool>;

    /// Applies idempotent state transitions to the given addresses.
    fn set(&self, mode: ModeSet, addresses: &[SwarmAddress]) -> Result<()>;

    /// The highest bin id assigned in `bin`.
    fn last_pull_bin_id(&self, bin: u8) -> Result<u64>;

    /// The pin counter for `address`; [`StorageError::NotFound`] when the
    /// address is not pinned.
    fn pin_count(&self, address: &SwarmAddress) -> Result<u64>;

    /// Enumerates pinned addresses in a deterministic (insertion) order.
    fn pinned_chunks(&self) -> Result<Vec<PinInfo>>;

    /// Streams `(address, bin_id)` for chunks in `bin` with
    /// `since < bin_id <= until`; `until = 0` keeps the subscription open,
    /// blocking on new arrivals until cancellation or [`Storer::close`].
    fn subscribe_pull(&self, bin: u8, since: u64, until: u64) -> PullSubscription;

    /// Signals the process-wide quit, unblocking every subscription.
    /// Idempotent.
    fn close(&self);
}
