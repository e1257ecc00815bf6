//! Upload tags.
//!
//! A tag groups the chunks of one upload and counts their progress through
//! the pipeline: split, stored locally, seen before, sent to the network,
//! acknowledged as synced. Counters are best-effort and monotone.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagState {
    Split,
    Stored,
    Seen,
    Sent,
    Synced,
}

/// Progress counters for a single upload.
#[derive(Debug, Default)]
pub struct Tag {
    uid: u32,
    split: AtomicU64,
    stored: AtomicU64,
    seen: AtomicU64,
    sent: AtomicU64,
    synced: AtomicU64,
}

impl Tag {
    fn new(uid: u32) -> Self {
        Self {
            uid,
            ..Default::default()
        }
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn inc(&self, state: TagState) {
        self.counter(state).fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, state: TagState) -> u64 {
        self.counter(state).load(Ordering::Relaxed)
    }

    fn counter(&self, state: TagState) -> &AtomicU64 {
        match state {
            TagState::Split => &self.split,
            TagState::Stored => &self.stored,
            TagState::Seen => &self.seen,
            TagState::Sent => &self.sent,
            TagState::Synced => &self.synced,
        }
    }
}

/// Registry of live upload tags.
#[derive(Debug, Default)]
pub struct Tags {
    tags: RwLock<HashMap<u32, Arc<Tag>>>,
    next_uid: AtomicU32,
}

impl Tags {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn create(&self) -> Arc<Tag> {
        let uid = self.next_uid.fetch_add(1, Ordering::Relaxed) + 1;
        let tag = Arc::new(Tag::new(uid));
        self.tags.write().insert(uid, Arc::clone(&tag));
        tag
    }

    pub fn get(&self, uid: u32) -> Option<Arc<Tag>> {
        self.tags.read().get(&uid).cloned()
    }
}
