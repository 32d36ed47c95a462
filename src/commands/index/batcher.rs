use anyhow::Result;
use tracing::debug;

use crate::vector_index::{IndexedDocument, VectorIndex};

pub(crate) const VECTOR_BATCH_SIZE: usize = 128;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct BatchStats {
    pub(crate) documents: usize,
    pub(crate) flushes: usize,
}

/// Buffers documents and writes them to the index in groups of at most
/// `batch_size`. Call `finish` once the row stream is exhausted.
pub(crate) struct IndexBatcher<'a, I: VectorIndex + ?Sized> {
    index: &'a mut I,
    batch_size: usize,
    pending: Vec<IndexedDocument>,
    stats: BatchStats,
}

impl<'a, I: VectorIndex + ?Sized> IndexBatcher<'a, I> {
    pub(crate) fn new(index: &'a mut I, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            index,
            batch_size,
            pending: Vec::with_capacity(batch_size),
            stats: BatchStats::default(),
        }
    }

    pub(crate) fn add(&mut self, document: IndexedDocument) -> Result<()> {
        self.pending.push(document);
        self.stats.documents += 1;
        if self.pending.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        self.index.upsert(&self.pending)?;
        self.stats.flushes += 1;
        debug!(
            documents = self.pending.len(),
            flushes = self.stats.flushes,
            "flushed index batch"
        );
        self.pending.clear();
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<BatchStats> {
        self.flush()?;
        Ok(self.stats)
    }
}
