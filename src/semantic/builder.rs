//! Backfills vectors for reviews that have none, or whose text changed.

use serde::Serialize;

use crate::semantic::embeddings::{EmbeddingSpace, Encoder};
use crate::semantic::index::VectorIndex;
use crate::semantic::preprocess::{content_hash, preprocess_review};
use crate::store::{PendingWrite, RepairStore, RetryPolicy, StoreError, WriteBatch};

/// Outcome of one builder run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Reviews that received a vector
    pub embedded: usize,
    /// Reviews with no text to embed
    pub skipped: usize,
    /// Reviews the encoder failed on; they stay pending for the next run
    pub failed: usize,
    /// Whether stored vectors were discarded because the model changed
    pub reset: bool,
}

pub struct EmbeddingIndexBuilder<'a> {
    store: &'a dyn RepairStore,
    encoder: &'a dyn Encoder,
    batch_size: usize,
    retry: RetryPolicy,
}

impl<'a> EmbeddingIndexBuilder<'a> {
    pub fn new(
        store: &'a dyn RepairStore,
        encoder: &'a dyn Encoder,
        batch_size: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            encoder,
            batch_size,
            retry,
        }
    }

    /// Embed every pending review.
    ///
    /// Rows are committed batch by batch, so an interrupted run keeps what it
    /// already wrote and a second run over an unchanged store writes nothing.
    /// A row the encoder rejects is logged and skipped.
    pub fn run(&self) -> Result<BuildReport, StoreError> {
        let mut report = BuildReport::default();
        let space = EmbeddingSpace::of(self.encoder);

        let mut batch = WriteBatch::new(self.store, self.batch_size, self.retry);

        match self.store.embedding_space()? {
            Some(stored) if stored == space => {}
            stored => {
                if stored.is_some() {
                    log::warn!(
                        "Model changed to '{}', discarding stored vectors",
                        self.encoder.name()
                    );
                }
                batch.push(PendingWrite::ResetEmbeddings(space))?;
                batch.commit()?;
                report.reset = stored.is_some();
            }
        }

        let pending = self.store.reviews_missing_embedding()?;
        let total = pending.len();
        log::info!(
            "Embedding {} reviews with '{}' in batches of {}",
            total,
            self.encoder.name(),
            self.batch_size
        );

        for (n, review) in pending.into_iter().enumerate() {
            let Some(text) = preprocess_review(&review.text) else {
                report.skipped += 1;
                continue;
            };

            match self.encoder.encode(&text) {
                Ok(vector) if vector.len() == space.dimensions && VectorIndex::is_storable(&vector) => {
                    batch.push(PendingWrite::ReviewEmbedding {
                        content_hash: content_hash(&review.text),
                        review_id: review.review_id,
                        vector,
                    })?;
                    report.embedded += 1;
                }
                Ok(vector) if vector.len() != space.dimensions => {
                    log::warn!(
                        "Skipping review {}: encoder returned {} dimensions, expected {}",
                        review.review_id,
                        vector.len(),
                        space.dimensions
                    );
                    report.failed += 1;
                }
                Ok(_) => {
                    log::warn!(
                        "Skipping review {}: encoder returned a zero or non-finite vector",
                        review.review_id
                    );
                    report.failed += 1;
                }
                Err(e) => {
                    log::warn!("Skipping review {}: {}", review.review_id, e);
                    report.failed += 1;
                }
            }

            if (n + 1) % self.batch_size.max(1) == 0 {
                log::info!("Embedded {}/{} reviews", n + 1, total);
            }
        }

        batch.finish()?;

        log::info!(
            "Embedding done: {} embedded, {} skipped, {} failed",
            report.embedded,
            report.skipped,
            report.failed
        );
        Ok(report)
    }
}
