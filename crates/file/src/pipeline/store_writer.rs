use tracing::trace;
use weft_primitives::{Chunk, SwarmAddress};
use weft_storage::{ModePut, Storer};

use super::{ChainWriter, FileError, PipeWriteArgs};

/// Stage 3: persists the addressed chunk and forwards the record, or
/// terminates the chain when it is the tail of a trie short pipeline.
#[derive(Debug)]
pub struct StoreWriter<S, W> {
    storer: S,
    mode: ModePut,
    next: Option<W>,
}

impl<S: Storer, W: ChainWriter> StoreWriter<S, W> {
    pub fn new(storer: S, mode: ModePut, next: W) -> Self {
        Self {
            storer,
            mode,
            next: Some(next),
        }
    }

    /// A terminal store writer, as used inside trie level wraps.
    pub fn tail(storer: S, mode: ModePut) -> Self {
        Self {
            storer,
            mode,
            next: None,
        }
    }
}

impl<S: Storer, W: ChainWriter> ChainWriter for StoreWriter<S, W> {
    fn chain_write(&mut self, args: &mut PipeWriteArgs) -> Result<(), FileError> {
        let address = SwarmAddress::from_slice(&args.reference);
        let chunk = Chunk::new(address, args.data.clone());
        self.storer.put(self.mode, &[chunk])?;
        trace!(%address, "pipeline stored chunk");

        match self.next.as_mut() {
            Some(next) => next.chain_write(args),
            None => Ok(()),
        }
    }

    fn sum(&mut self) -> Result<Vec<u8>, FileError> {
        match self.next.as_mut() {
            Some(next) => next.sum(),
            None => Ok(Vec::new()),
        }
    }
}
