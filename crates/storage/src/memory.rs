//! In-memory reference storer.

use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::Arc,
};

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use weft_primitives::{proximity, Chunk, ChunkValidator, SwarmAddress, ValidatorSet, MAX_BINS};

use crate::{
    Descriptor, ModeGet, ModePut, ModeSet, PinInfo, PullSubscription, Result, StorageError, Storer,
    TagState, Tags,
};

/// In-memory [`Storer`].
///
/// A single `RwLock` guards all state: mutating operations serialize on the
/// writer side, `has`/`get` share the reader side. Pull subscriptions are
/// woken through a [`Notify`] on every novel put and terminated by a
/// store-wide quit token.
#[derive(Debug, Clone)]
pub struct MemStorer {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    base: SwarmAddress,
    validators: Option<ValidatorSet>,
    tags: Option<Arc<Tags>>,
    state: RwLock<State>,
    new_chunks: Notify,
    quit: CancellationToken,
}

#[derive(Debug, Default)]
struct State {
    chunks: HashMap<SwarmAddress, Bytes>,
    // pinned addresses in insertion order, with their counters
    pinned: Vec<(SwarmAddress, u64)>,
    // highest assigned id per bin; ids start at 1
    bins: Vec<u64>,
    // (bin, bin_id) -> address, the pull iteration order
    bin_index: BTreeMap<(u8, u64), SwarmAddress>,
    // last-access ordering for eviction hints
    access: HashMap<SwarmAddress, u64>,
    access_clock: u64,
}

impl MemStorer {
    pub fn new(base: SwarmAddress) -> Self {
        Self {
            inner: Arc::new(Inner {
                base,
                validators: None,
                tags: None,
                state: RwLock::new(State {
                    bins: vec![0; MAX_BINS as usize],
                    ..Default::default()
                }),
                new_chunks: Notify::new(),
                quit: CancellationToken::new(),
            }),
        }
    }

    /// Rejects puts that no validator in `validators` accepts.
    pub fn with_validators(self, validators: ValidatorSet) -> Self {
        self.rebuild(|inner| inner.validators = Some(validators))
    }

    /// Maintains tag counters for chunks carrying a tag id.
    pub fn with_tags(self, tags: Arc<Tags>) -> Self {
        self.rebuild(|inner| inner.tags = Some(tags))
    }

    fn rebuild(self, f: impl FnOnce(&mut Inner)) -> Self {
        let mut inner = Arc::into_inner(self.inner)
            .expect("builder runs before the storer is shared");
        f(&mut inner);
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn base(&self) -> &SwarmAddress {
        &self.inner.base
    }

    /// Last-access sequence number for `address`, if it was ever accessed.
    pub fn access_order(&self, address: &SwarmAddress) -> Option<u64> {
        self.inner.state.read().access.get(address).copied()
    }

    fn bump_tag(&self, chunk: &Chunk, state: TagState) {
        let (Some(tags), Some(uid)) = (self.inner.tags.as_ref(), chunk.tag_id()) else {
            return;
        };
        if let Some(tag) = tags.get(uid) {
            tag.inc(state);
        }
    }
}

impl Storer for MemStorer {
    fn put(&self, mode: ModePut, chunks: &[Chunk]) -> Result<Vec<bool>> {
        if self.inner.quit.is_cancelled() {
            return Err(StorageError::Closed);
        }

        if let Some(validators) = &self.inner.validators {
            if chunks.iter().any(|ch| !validators.validate(ch)) {
                return Err(StorageError::InvalidChunk);
            }
        }

        let mut exists = Vec::with_capacity(chunks.len());
        let mut novel = false;
        {
            let mut state = self.inner.state.write();
            for chunk in chunks {
                let address = *chunk.address();
                if state.chunks.contains_key(&address) {
                    exists.push(true);
                    self.bump_tag(chunk, TagState::Seen);
                    continue;
                }

                let bin = proximity(&address, &self.inner.base);
                state.bins[bin as usize] += 1;
                let bin_id = state.bins[bin as usize];
                state.bin_index.insert((bin, bin_id), address);
                state.chunks.insert(address, chunk.data().clone());
                exists.push(false);
                novel = true;

                trace!(%address, bin, bin_id, ?mode, "stored chunk");
                match mode {
                    ModePut::Upload => self.bump_tag(chunk, TagState::Stored),
                    ModePut::Sync => self.bump_tag(chunk, TagState::Synced),
                    ModePut::Request => {}
                }
            }
        }

        if novel {
            self.inner.new_chunks.notify_waiters();
        }
        Ok(exists)
    }

    fn get(&self, _mode: ModeGet, address: &SwarmAddress) -> Result<Chunk> {
        let state = self.inner.state.read();
        state
            .chunks
            .get(address)
            .map(|data| Chunk::new(*address, data.clone()))
            .ok_or(StorageError::NotFound)
    }

    fn has(&self, address: &SwarmAddress) -> Result<bool> {
        Ok(self.inner.state.read().chunks.contains_key(address))
    }

    fn set(&self, mode: ModeSet, addresses: &[SwarmAddress]) -> Result<()> {
        let mut state = self.inner.state.write();
        for address in addresses {
            match mode {
                ModeSet::Access => {
                    state.access_clock += 1;
                    let clock = state.access_clock;
                    state.access.insert(*address, clock);
                }
                ModeSet::Pin => {
                    match state.pinned.iter_mut().find(|(a, _)| a == address) {
                        Some((_, counter)) => *counter += 1,
                        None => state.pinned.push((*address, 1)),
                    }
                }
                ModeSet::Unpin => {
                    let Some(idx) = state.pinned.iter().position(|(a, _)| a == address) else {
                        return Err(StorageError::NotFound);
                    };
                    state.pinned[idx].1 -= 1;
                    if state.pinned[idx].1 == 0 {
                        state.pinned.remove(idx);
                    }
                }
            }
        }
        Ok(())
    }

    fn last_pull_bin_id(&self, bin: u8) -> Result<u64> {
        Ok(self.inner.state.read().bins[bin as usize])
    }

    fn pin_count(&self, address: &SwarmAddress) -> Result<u64> {
        self.inner
            .state
            .read()
            .pinned
            .iter()
            .find(|(a, _)| a == address)
            .map(|(_, counter)| *counter)
            .ok_or(StorageError::NotFound)
    }

    fn pinned_chunks(&self) -> Result<Vec<PinInfo>> {
        Ok(self
            .inner
            .state
            .read()
            .pinned
            .iter()
            .map(|(address, pin_counter)| PinInfo {
                address: *address,
                pin_counter: *pin_counter,
            })
            .collect())
    }

    fn subscribe_pull(&self, bin: u8, since: u64, until: u64) -> PullSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let task_token = token.clone();

        tokio::spawn(async move {
            let upper = match until {
                0 => u64::MAX,
                n => n,
            };
            let mut cursor = since;

            loop {
                // register for wakeups before scanning so a concurrent put
                // cannot slip between scan and wait
                let notified = inner.new_chunks.notified();
                tokio::pin!(notified);

                let batch: Vec<Descriptor> = {
                    let state = inner.state.read();
                    state
                        .bin_index
                        .range((Bound::Excluded((bin, cursor)), Bound::Included((bin, upper))))
                        .map(|(&(_, bin_id), &address)| Descriptor { address, bin_id })
                        .collect()
                };

                for descriptor in batch {
                    cursor = descriptor.bin_id;
                    if tx.send(descriptor).is_err() {
                        return;
                    }
                }

                if until != 0 && cursor >= until {
                    debug!(bin, until, "pull subscription drained");
                    return;
                }

                tokio::select! {
                    _ = &mut notified => {}
                    _ = task_token.cancelled() => return,
                    _ = inner.quit.cancelled() => return,
                    _ = tx.closed() => return,
                }
            }
        });

        PullSubscription::new(rx, token)
    }

    fn close(&self) {
        self.inner.quit.cancel();
    }
}
