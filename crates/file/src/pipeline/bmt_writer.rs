use std::sync::Arc;

use weft_primitives::{bmt::Pool, SPAN_SIZE};

use super::{ChainWriter, FileError, PipeWriteArgs};

/// Stage 2: attaches the BMT content address of `span ‖ payload` to the
/// record, using a hasher on loan from the shared pool.
#[derive(Debug)]
pub struct BmtWriter<W> {
    pool: Arc<Pool>,
    next: W,
}

impl<W: ChainWriter> BmtWriter<W> {
    pub fn new(pool: Arc<Pool>, next: W) -> Self {
        Self { pool, next }
    }
}

impl<W: ChainWriter> ChainWriter for BmtWriter<W> {
    fn chain_write(&mut self, args: &mut PipeWriteArgs) -> Result<(), FileError> {
        if args.data.len() < SPAN_SIZE {
            return Err(FileError::InvalidData(args.data.len()));
        }

        let span = u64::from_le_bytes(args.data[..SPAN_SIZE].try_into().expect("span is 8 bytes"));

        let mut hasher = self.pool.get_hasher();
        hasher.set_span(span);
        hasher.write(&args.data[SPAN_SIZE..]);
        args.reference = hasher.hash().to_vec();
        args.span = args.data[..SPAN_SIZE].to_vec();

        self.next.chain_write(args)
    }

    fn sum(&mut self) -> Result<Vec<u8>, FileError> {
        self.next.sum()
    }
}
