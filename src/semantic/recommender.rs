//! Free-text problem description to candidate shops.

use std::collections::BTreeSet;

use crate::semantic::embeddings::{EmbeddingError, EmbeddingSpace, Encoder};
use crate::store::{RepairStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SimilarityError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Finds shops whose reviews read like the query.
pub struct SimilarityRecommender<'a> {
    store: &'a dyn RepairStore,
    encoder: &'a dyn Encoder,
    k: usize,
}

impl<'a> SimilarityRecommender<'a> {
    pub fn new(store: &'a dyn RepairStore, encoder: &'a dyn Encoder, k: usize) -> Self {
        Self { store, encoder, k }
    }

    /// Distinct business IDs behind the `k` reviews nearest to `query`.
    ///
    /// Empty when no vectors have been built. Fails if the stored vectors
    /// come from a different model than the encoder.
    pub fn candidates(&self, query: &str) -> Result<BTreeSet<String>, SimilarityError> {
        let Some(stored) = self.store.embedding_space()? else {
            log::debug!("no review vectors stored");
            return Ok(BTreeSet::new());
        };
        if stored != EmbeddingSpace::of(self.encoder) {
            return Err(EmbeddingError::SpaceMismatch.into());
        }

        let query_vector = self.encoder.encode(query)?;
        let neighbors = self.store.nearest_reviews(&query_vector, self.k)?;

        log::debug!("{} neighbouring reviews for query", neighbors.len());
        Ok(neighbors.into_iter().map(|n| n.business_id).collect())
    }
}
