use weft_primitives::SPAN_SIZE;

use super::{ChainWriter, FileError, PipeWriteArgs, Pipeline};

/// Stage 1: buffers caller bytes and flushes a chunk downstream whenever a
/// full chunk's worth has accumulated; `sum` flushes the short tail.
///
/// Every emission carries its own span equal to its payload length.
#[derive(Debug)]
pub struct ChunkFeeder<W> {
    size: usize,
    next: W,
    buf: Vec<u8>,
    flushed: bool,
}

impl<W: ChainWriter> ChunkFeeder<W> {
    pub fn new(size: usize, next: W) -> Self {
        Self {
            size,
            next,
            buf: Vec::with_capacity(size),
            flushed: false,
        }
    }

    fn flush(&mut self, payload: &[u8]) -> Result<(), FileError> {
        let mut data = Vec::with_capacity(SPAN_SIZE + payload.len());
        data.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        data.extend_from_slice(payload);

        let mut args = PipeWriteArgs {
            data,
            ..Default::default()
        };
        self.flushed = true;
        self.next.chain_write(&mut args)
    }
}

impl<W: ChainWriter> Pipeline for ChunkFeeder<W> {
    fn write(&mut self, data: &[u8]) -> Result<usize, FileError> {
        self.buf.extend_from_slice(data);

        while self.buf.len() >= self.size {
            let payload: Vec<u8> = self.buf.drain(..self.size).collect();
            self.flush(&payload)?;
        }
        Ok(data.len())
    }

    fn sum(&mut self) -> Result<Vec<u8>, FileError> {
        // the tail flush also covers the empty stream, which still has a
        // (zero-span) root chunk
        if !self.buf.is_empty() || !self.flushed {
            let tail = std::mem::take(&mut self.buf);
            self.flush(&tail)?;
        }
        self.next.sum()
    }
}
