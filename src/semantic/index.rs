//! In-memory vector index with Euclidean nearest-neighbour search.
//!
//! Stores review embeddings keyed by review ID.

use std::cmp::Ordering;
use std::collections::HashMap;

/// An entry in the vector index.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// Hash of the text that was embedded
    pub content_hash: u64,
    pub embedding: Vec<f32>,
}

/// In-memory vector index.
///
/// Stores embeddings keyed by review ID, supporting:
/// - Insert/update/remove operations
/// - Exact k-nearest search by L2 distance
#[derive(Debug, Clone)]
pub struct VectorIndex {
    entries: HashMap<String, VectorEntry>,
    dimensions: usize,
}

/// A neighbour returned by [`VectorIndex::nearest`].
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    /// Euclidean distance to the query
    pub distance: f32,
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: HashMap::new(),
            dimensions,
        }
    }

    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Insert or update an entry in the index.
    ///
    /// Returns an error if the embedding has the wrong length, a zero norm, or
    /// a non-finite component.
    pub fn insert(
        &mut self,
        id: &str,
        content_hash: u64,
        embedding: Vec<f32>,
    ) -> Result<(), IndexError> {
        self.check_dimensions(&embedding)?;

        if !Self::is_storable(&embedding) {
            return Err(IndexError::ZeroNormVector);
        }

        self.entries.insert(
            id.to_string(),
            VectorEntry {
                content_hash,
                embedding,
            },
        );

        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<VectorEntry> {
        self.entries.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&VectorEntry> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VectorEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The `k` entries closest to `query`, nearest first.
    ///
    /// Ties on distance are broken by ID so results are reproducible.
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        self.check_dimensions(query)?;

        let mut results: Vec<Neighbor> = self
            .entries
            .iter()
            .map(|(id, entry)| Neighbor {
                id: id.clone(),
                distance: Self::l2_distance(query, &entry.embedding),
            })
            .collect();

        results.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(k);

        Ok(results)
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        Ok(())
    }

    /// Finite with a non-zero norm.
    pub fn is_storable(vector: &[f32]) -> bool {
        vector.iter().all(|v| v.is_finite()) && Self::l2_norm(vector) >= f32::EPSILON
    }

    fn l2_norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot store a zero-norm or non-finite vector")]
    ZeroNormVector,
}
