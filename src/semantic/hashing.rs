//! Feature-hashing encoder.
//!
//! Deterministic dense vectors with no model download: stemmed terms are
//! hashed (FNV-1a) into fixed buckets, weighted by term frequency, and the
//! result is L2-normalized. Far weaker than a sentence model but enough to
//! group reviews that share vocabulary, and always available offline.

use std::collections::HashMap;

use rust_stemmers::{Algorithm, Stemmer};

use crate::semantic::embeddings::{EmbeddingError, Encoder};

/// Model name that selects this encoder in config.
pub const HASHING_MODEL: &str = "hashing";

pub struct HashEncoder {
    dimensions: usize,
    stemmer: Stemmer,
}

impl HashEncoder {
    pub fn new(dimensions: usize) -> Result<Self, EmbeddingError> {
        if dimensions == 0 {
            return Err(EmbeddingError::InvalidModel(
                "hashing encoder needs at least one dimension".to_string(),
            ));
        }
        Ok(Self {
            dimensions,
            stemmer: Stemmer::create(Algorithm::English),
        })
    }

    fn bucket(&self, term: &str) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % self.dimensions as u64) as usize
    }
}

impl Encoder for HashEncoder {
    fn name(&self) -> &str {
        HASHING_MODEL
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let lowered = text.to_lowercase();
        let mut tf: HashMap<String, f32> = HashMap::new();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() >= 2)
        {
            *tf.entry(self.stemmer.stem(word).into_owned()).or_default() += 1.0;
        }

        if tf.is_empty() {
            return Err(EmbeddingError::EmbeddingFailed(
                "text has no encodable terms".to_string(),
            ));
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for (term, count) in &tf {
            vector[self.bucket(term)] += count;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        for v in &mut vector {
            *v /= norm;
        }

        Ok(vector)
    }
}
