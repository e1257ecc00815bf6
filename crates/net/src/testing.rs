//! In-memory streamer for protocol tests.
//!
//! Streams are [`tokio::io::duplex`] pipes; the remote end of each opened
//! stream is handed to the handler registered for the peer, which runs the
//! responder side on its own task.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio::io::DuplexStream;
use tracing::debug;
use weft_primitives::SwarmAddress;

use crate::{NetError, Streamer, MAX_MESSAGE_SIZE};

type Handler = Arc<dyn Fn(SwarmAddress, DuplexStream) -> BoxFuture<'static, ()> + Send + Sync>;

/// A [`Streamer`] over in-memory duplex pipes.
#[derive(Default)]
pub struct TestStreamer {
    handlers: RwLock<HashMap<SwarmAddress, Handler>>,
    blocklist: Mutex<HashMap<SwarmAddress, Instant>>,
}

impl std::fmt::Debug for TestStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestStreamer")
            .field("peers", &self.handlers.read().len())
            .finish()
    }
}

impl TestStreamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the responder run for every stream opened to `peer`.
    pub fn register<F>(&self, peer: SwarmAddress, handler: F)
    where
        F: Fn(SwarmAddress, DuplexStream) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.handlers.write().insert(peer, Arc::new(handler));
    }

    /// Peers currently blocklisted.
    pub fn blocklisted_peers(&self) -> Vec<SwarmAddress> {
        let now = Instant::now();
        self.blocklist
            .lock()
            .iter()
            .filter(|(_, until)| **until > now)
            .map(|(peer, _)| *peer)
            .collect()
    }
}

#[async_trait]
impl Streamer for TestStreamer {
    type Stream = DuplexStream;

    async fn new_stream(&self, peer: &SwarmAddress) -> Result<DuplexStream, NetError> {
        if self.is_blocklisted(peer) {
            return Err(NetError::Blocklisted);
        }

        let handler = self
            .handlers
            .read()
            .get(peer)
            .cloned()
            .ok_or(NetError::NoRoute)?;

        let (local, remote) = tokio::io::duplex(MAX_MESSAGE_SIZE);
        tokio::spawn(handler(*peer, remote));
        Ok(local)
    }

    fn blocklist(&self, peer: &SwarmAddress, duration: Duration) {
        debug!(%peer, ?duration, "blocklisting peer");
        self.blocklist.lock().insert(*peer, Instant::now() + duration);
    }

    fn is_blocklisted(&self, peer: &SwarmAddress) -> bool {
        match self.blocklist.lock().get(peer) {
            Some(until) => *until > Instant::now(),
            None => false,
        }
    }
}
