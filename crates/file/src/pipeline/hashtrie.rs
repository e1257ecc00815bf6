use weft_primitives::SPAN_SIZE;

use super::{ChainWriter, FileError, PipeWriteArgs};

/// Maximum trie depth; the trie addresses up to
/// `branching ^ (MAX_TRIE_LEVELS - 1)` leaf chunks.
pub const MAX_TRIE_LEVELS: usize = 8;

/// Factory for the short pipelines (BMT -> store) a level wrap is hashed
/// and persisted through.
pub type PipelineFn = Box<dyn FnMut() -> Box<dyn ChainWriter> + Send>;

/// Stage 4: accumulates `(span ‖ reference)` records level by level.
///
/// A level reaching `branching` records is wrapped: the spans are summed,
/// the references concatenated into an inner chunk which is hashed and
/// stored through a short pipeline, and the resulting record written one
/// level up. `sum` carries dangling single records upward unchanged, so no
/// 1-arity wrapper chunks appear on the rightmost path.
pub struct HashTrieWriter {
    branching: usize,
    ref_size: usize,
    /// bytes held by a level holding `branching` records
    full_level: usize,
    /// per-level record buffers; index 0 is unused, leaf records enter at 1
    levels: Vec<Vec<u8>>,
    /// set once a record lands on the top level; later writes overflow
    full: bool,
    pipeline_fn: PipelineFn,
}

impl std::fmt::Debug for HashTrieWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashTrieWriter")
            .field("branching", &self.branching)
            .field("ref_size", &self.ref_size)
            .field("full", &self.full)
            .finish()
    }
}

impl HashTrieWriter {
    pub fn new(
        chunk_size: usize,
        branching: usize,
        ref_size: usize,
        pipeline_fn: PipelineFn,
    ) -> Self {
        // a full level holds `branching` records: one chunk's worth of
        // references plus their spans
        let level_capacity = chunk_size + SPAN_SIZE * branching;
        Self {
            branching,
            ref_size,
            full_level: (ref_size + SPAN_SIZE) * branching,
            levels: (0..=MAX_TRIE_LEVELS)
                .map(|_| Vec::with_capacity(level_capacity))
                .collect(),
            full: false,
            pipeline_fn,
        }
    }

    fn one_ref(&self) -> usize {
        self.ref_size + SPAN_SIZE
    }

    fn write_to_level(
        &mut self,
        level: usize,
        span: &[u8],
        reference: &[u8],
    ) -> Result<(), FileError> {
        self.levels[level].extend_from_slice(span);
        self.levels[level].extend_from_slice(reference);

        if level == MAX_TRIE_LEVELS {
            // the root slot is occupied; the trie cannot take another leaf
            self.full = true;
            return Ok(());
        }

        if self.levels[level].len() == self.full_level {
            return self.wrap_level(level);
        }
        Ok(())
    }

    /// Hashes and stores all records of `level` as one inner chunk and
    /// writes the resulting record to `level + 1`, emptying `level`.
    fn wrap_level(&mut self, level: usize) -> Result<(), FileError> {
        let records = std::mem::take(&mut self.levels[level]);

        let mut span_sum = 0u64;
        let mut refs = Vec::with_capacity(records.len() / self.one_ref() * self.ref_size);
        for record in records.chunks(self.one_ref()) {
            span_sum += u64::from_le_bytes(
                record[..SPAN_SIZE].try_into().expect("record starts with span"),
            );
            refs.extend_from_slice(&record[SPAN_SIZE..]);
        }

        let span = span_sum.to_le_bytes();
        let mut data = Vec::with_capacity(SPAN_SIZE + refs.len());
        data.extend_from_slice(&span);
        data.extend_from_slice(&refs);

        let mut args = PipeWriteArgs {
            span: span.to_vec(),
            data,
            ..Default::default()
        };
        let mut writer = (self.pipeline_fn)();
        writer.chain_write(&mut args)?;

        let (span, reference) = (args.span, args.reference);
        self.write_to_level(level + 1, &span, &reference)
    }
}

impl ChainWriter for HashTrieWriter {
    /// Accepts reference records from the previous stage; by definition
    /// these land on level 1.
    fn chain_write(&mut self, args: &mut PipeWriteArgs) -> Result<(), FileError> {
        if (args.span.len() + args.reference.len()) % self.one_ref() != 0 {
            return Err(FileError::InconsistentRefs);
        }
        if self.full {
            return Err(FileError::TrieFull);
        }
        let (span, reference) = (args.span.clone(), args.reference.clone());
        self.write_to_level(1, &span, &reference)
    }

    /// Folds the remaining level state into the root reference:
    /// a level with a single record is promoted unchanged (dangling
    /// subtree), a level with more is wrapped, until only the top record
    /// remains.
    fn sum(&mut self) -> Result<Vec<u8>, FileError> {
        for level in 1..MAX_TRIE_LEVELS {
            let len = self.levels[level].len();
            if len % self.one_ref() != 0 {
                return Err(FileError::InconsistentRefs);
            }
            match len {
                0 => continue,
                l if l == self.one_ref() => {
                    // dangling subtree: carry the record up as-is
                    let record = std::mem::take(&mut self.levels[level]);
                    self.levels[level + 1].extend_from_slice(&record);
                }
                _ => self.wrap_level(level)?,
            }
        }

        let top = &self.levels[MAX_TRIE_LEVELS];
        if top.len() != self.one_ref() {
            return Err(FileError::InconsistentRefs);
        }
        Ok(top[SPAN_SIZE..].to_vec())
    }
}
