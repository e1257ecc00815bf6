//! Access modes qualifying store operations.
//!
//! Modes tag the intent of an operation so the store can maintain tag
//! counters and eviction ordering; they never change what a call returns.

/// Why a chunk is being persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModePut {
    /// User-originated upload; bumps the chunk's tag "stored" counter.
    Upload,
    /// Peer-delivered via sync; bumps the tag "synced" counter.
    Sync,
    /// Backfill of a chunk fetched through retrieval.
    Request,
}

/// Why a chunk is being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeGet {
    /// Serving or satisfying a retrieval.
    Request,
    /// Read on behalf of a sync protocol.
    Sync,
    /// Internal lookup that must not disturb eviction ordering.
    Lookup,
}

/// State transition applied by [`crate::Storer::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeSet {
    /// Bump last-access ordering.
    Access,
    /// Increment the pin counter; enters the pinned set on 0 -> 1.
    Pin,
    /// Decrement the pin counter; leaves the pinned set on 1 -> 0.
    Unpin,
}
