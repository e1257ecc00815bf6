//! Persistent per-peer connection metrics.
//!
//! Counters live in memory, each entry behind its own lock, and are
//! persisted as two per-peer u64 records under
//! `peer-last-seen-timestamp-<addr>` and
//! `peer-total-connection-duration-<addr>`. Entries outlive disconnects.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use parking_lot::{Mutex, RwLock};
use tracing::warn;
use weft_primitives::SwarmAddress;

const PEER_LAST_SEEN_TIMESTAMP: &str = "peer-last-seen-timestamp";
const PEER_TOTAL_CONNECTION_DURATION: &str = "peer-total-connection-duration";

/// Minimal sorted-store surface the collector persists through. The
/// concrete engine is the embedding node's choice.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<u64>;
    fn put(&self, key: &str, value: u64);
}

/// In-memory [`KvStore`].
#[derive(Debug, Default)]
pub struct MemKv {
    entries: RwLock<HashMap<String, u64>>,
}

impl KvStore for MemKv {
    fn get(&self, key: &str) -> Option<u64> {
        self.entries.read().get(key).copied()
    }

    fn put(&self, key: &str, value: u64) {
        self.entries.write().insert(key.to_owned(), value);
    }
}

/// Session connection direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// A metrics mutation applied through [`Collector::record`].
#[derive(Debug, Clone, Copy)]
pub enum RecordOp {
    /// Marks the peer logged in at the given time; ignored while already
    /// logged in.
    LogIn(SystemTime, Direction),
    /// Closes the session, folding its duration into the total; ignored
    /// while not logged in.
    LogOut(SystemTime),
}

#[derive(Debug, Default)]
struct Counters {
    logged_in: bool,
    direction: Option<Direction>,
    last_seen_ns: u64,
    session_duration_ns: u64,
    total_duration_ns: u64,
    dirty: bool,
}

/// Point-in-time view of a peer's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub last_seen_ns: u64,
    pub session_duration_ns: u64,
    pub total_duration_ns: u64,
}

/// Collects per-peer connection metrics and persists them through a
/// [`KvStore`].
pub struct Collector {
    store: Box<dyn KvStore>,
    counters: RwLock<HashMap<SwarmAddress, Arc<Mutex<Counters>>>>,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("peers", &self.counters.read().len())
            .finish()
    }
}

impl Collector {
    pub fn new(store: Box<dyn KvStore>) -> Self {
        Self {
            store,
            counters: RwLock::new(HashMap::new()),
        }
    }

    /// Applies `ops` to the peer's counters, loading persisted values on
    /// first touch.
    pub fn record(&self, peer: &SwarmAddress, ops: &[RecordOp]) {
        let entry = self.entry(peer);
        let mut counters = entry.lock();

        for op in ops {
            match *op {
                RecordOp::LogIn(t, direction) => {
                    if counters.logged_in {
                        continue;
                    }
                    counters.logged_in = true;
                    counters.direction = Some(direction);
                    counters.last_seen_ns = unix_ns(t);
                    counters.dirty = true;
                }
                RecordOp::LogOut(t) => {
                    if !counters.logged_in {
                        continue;
                    }
                    counters.logged_in = false;
                    let now = unix_ns(t);
                    counters.session_duration_ns = now.saturating_sub(counters.last_seen_ns);
                    counters.total_duration_ns += counters.session_duration_ns;
                    counters.last_seen_ns = now;
                    counters.dirty = true;
                }
            }
        }
    }

    pub fn snapshot(&self, peer: &SwarmAddress) -> Option<Snapshot> {
        let counters = self.counters.read().get(peer).cloned()?;
        let counters = counters.lock();
        Some(Snapshot {
            last_seen_ns: counters.last_seen_ns,
            session_duration_ns: counters.session_duration_ns,
            total_duration_ns: counters.total_duration_ns,
        })
    }

    /// Writes every dirty counter pair back to the store.
    pub fn flush(&self) {
        let counters = self.counters.read();
        for (peer, entry) in counters.iter() {
            let mut entry = entry.lock();
            if !entry.dirty {
                continue;
            }
            self.store
                .put(&peer_key(PEER_LAST_SEEN_TIMESTAMP, peer), entry.last_seen_ns);
            self.store.put(
                &peer_key(PEER_TOTAL_CONNECTION_DURATION, peer),
                entry.total_duration_ns,
            );
            entry.dirty = false;
        }
    }

    fn entry(&self, peer: &SwarmAddress) -> Arc<Mutex<Counters>> {
        if let Some(entry) = self.counters.read().get(peer) {
            return Arc::clone(entry);
        }

        let mut counters = self.counters.write();
        Arc::clone(counters.entry(*peer).or_insert_with(|| {
            Arc::new(Mutex::new(Counters {
                last_seen_ns: self
                    .store
                    .get(&peer_key(PEER_LAST_SEEN_TIMESTAMP, peer))
                    .unwrap_or_default(),
                total_duration_ns: self
                    .store
                    .get(&peer_key(PEER_TOTAL_CONNECTION_DURATION, peer))
                    .unwrap_or_default(),
                ..Default::default()
            }))
        }))
    }
}

fn peer_key(prefix: &str, peer: &SwarmAddress) -> String {
    format!("{prefix}-{peer:x}")
}

fn unix_ns(t: SystemTime) -> u64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as u64,
        Err(_) => {
            warn!("time before unix epoch");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn peer(first: u8) -> SwarmAddress {
        let mut bytes = [0u8; 32];
        bytes[0] = first;
        SwarmAddress::from(bytes)
    }

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_login_logout_durations() {
        let collector = Collector::new(Box::new(MemKv::default()));
        let p = peer(1);

        collector.record(&p, &[RecordOp::LogIn(at(100), Direction::Inbound)]);
        // double login ignored
        collector.record(&p, &[RecordOp::LogIn(at(150), Direction::Inbound)]);
        collector.record(&p, &[RecordOp::LogOut(at(160))]);

        let snapshot = collector.snapshot(&p).unwrap();
        assert_eq!(snapshot.session_duration_ns, 60 * 1_000_000_000);
        assert_eq!(snapshot.total_duration_ns, 60 * 1_000_000_000);
        assert_eq!(snapshot.last_seen_ns, 160 * 1_000_000_000);

        // logout without login ignored
        collector.record(&p, &[RecordOp::LogOut(at(170))]);
        assert_eq!(collector.snapshot(&p).unwrap(), snapshot);
    }

    #[test]
    fn test_flush_and_reload() {
        let store = Box::new(MemKv::default());
        let p = peer(2);
        let key = peer_key(PEER_TOTAL_CONNECTION_DURATION, &p);

        let collector = Collector::new(store);
        collector.record(&p, &[RecordOp::LogIn(at(10), Direction::Outbound)]);
        collector.record(&p, &[RecordOp::LogOut(at(40))]);
        collector.flush();

        assert_eq!(collector.store.get(&key), Some(30 * 1_000_000_000));

        // a fresh collector over the same store resumes the totals
        let collector2 = Collector {
            store: collector.store,
            counters: RwLock::new(HashMap::new()),
        };
        collector2.record(&p, &[RecordOp::LogIn(at(50), Direction::Outbound)]);
        collector2.record(&p, &[RecordOp::LogOut(at(60))]);
        assert_eq!(
            collector2.snapshot(&p).unwrap().total_duration_ns,
            40 * 1_000_000_000
        );
    }

    #[test]
    fn test_key_format() {
        let p = SwarmAddress::repeat_byte(0xab);
        assert_eq!(
            peer_key(PEER_LAST_SEEN_TIMESTAMP, &p),
            format!("peer-last-seen-timestamp-{}", "ab".repeat(32))
        );
    }
}
