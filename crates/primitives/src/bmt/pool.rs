use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use tokio::sync::{mpsc, Mutex};

use super::Hasher;

/// Provides a bounded pool of reusable BMT hashers.
///
/// A hasher popped from the pool is guaranteed to have a clean state ready
/// for hashing a new chunk. Acquisition blocks while the pool is drained;
/// dropping a [`PooledHasher`] returns the instance.
#[derive(Debug)]
pub struct Pool {
    sender: mpsc::Sender<Hasher>,
    receiver: Mutex<mpsc::Receiver<Hasher>>,
}

impl Pool {
    /// Initialize the pool with `capacity` pre-allocated hashers.
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(capacity);

        for _ in 0..capacity {
            sender
                .try_send(Hasher::new())
                .expect("pool channel sized to capacity");
        }

        Arc::new(Pool {
            sender,
            receiver: Mutex::new(receiver),
        })
    }

    /// Acquire a hasher, blocking the calling thread until one is free.
    ///
    /// Must not be called from an async context; the hashing pipeline runs
    /// on blocking threads.
    pub fn get_hasher(self: &Arc<Self>) -> PooledHasher {
        let hasher = self
            .receiver
            .blocking_lock()
            .blocking_recv()
            .expect("pool channel never closes");

        PooledHasher {
            inner: Some(hasher),
            pool: Arc::clone(self),
        }
    }
}

/// A [`Hasher`] on loan from a [`Pool`]; returned, reset, on drop.
#[derive(Debug)]
pub struct PooledHasher {
    inner: Option<Hasher>,
    pool: Arc<Pool>,
}

impl Deref for PooledHasher {
    type Target = Hasher;

    fn deref(&self) -> &Hasher {
        self.inner.as_ref().expect("present until drop")
    }
}

impl DerefMut for PooledHasher {
    fn deref_mut(&mut self) -> &mut Hasher {
        self.inner.as_mut().expect("present until drop")
    }
}

impl Drop for PooledHasher {
    fn drop(&mut self) {
        if let Some(mut hasher) = self.inner.take() {
            hasher.reset();
            let _ = self.pool.sender.try_send(hasher);
        }
    }
}
