//! Review embeddings and similarity search.
//!
//! # Architecture
//!
//! - `embeddings`: `Encoder` trait and the fastembed-backed model
//! - `hashing`: offline feature-hashing encoder
//! - `index`: in-memory vector index with L2 nearest-neighbour search
//! - `storage`: binary file I/O for vectors.bin persistence
//! - `preprocess`: text preprocessing for embedding input
//! - `builder`: backfills vectors for reviews that lack one
//! - `recommender`: free-text query to candidate shops

pub mod builder;
pub mod embeddings;
pub mod hashing;
mod index;
mod preprocess;
mod recommender;
mod storage;

pub use builder::EmbeddingIndexBuilder;
pub use embeddings::{encoder_for, EmbeddingError, EmbeddingSpace, Encoder};
pub use index::{IndexError, VectorIndex};
pub use preprocess::content_hash;
pub use recommender::{SimilarityError, SimilarityRecommender};
pub use storage::{VectorStorage, VectorStorageError};

/// Default embedding model name
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Reviews retrieved per similarity query
pub const DEFAULT_SIMILARITY_K: usize = 100;
