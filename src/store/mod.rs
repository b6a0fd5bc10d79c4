//! Persistent records and the storage seam.
//!
//! Every component that reads or writes shops, reviews or review vectors
//! goes through [`RepairStore`]. Writes are expressed as [`PendingWrite`]s
//! and applied in all-or-nothing batches.

mod batch;
mod csv;

pub use batch::{RetryPolicy, WriteBatch};
pub use csv::BackendCsv;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::semantic::{EmbeddingSpace, IndexError, VectorStorageError};

/// Placeholder written to `past_businesses`/`best_business` for shops with
/// no classified review.
pub const UNKNOWN: &str = "unknown";

/// A repair shop. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Business {
    pub business_id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub stars: f32,
    #[serde(default)]
    pub review_count: u32,
    /// Tally of classified faults, e.g. `brakes(3),engine(1)`
    pub past_businesses: Option<String>,
    /// Category this shop handled most often
    pub best_business: Option<String>,
}

/// A customer review of a shop. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub review_id: String,
    pub business_id: String,
    pub stars: Option<f32>,
    pub text: String,
    #[serde(default, with = "review_date")]
    pub date: Option<NaiveDate>,
    pub fault_type: Option<String>,
}

/// A review near a query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewNeighbor {
    pub review_id: String,
    pub business_id: String,
    pub distance: f32,
}

/// One staged mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    /// Set the classified category of a review; `None` clears it.
    ReviewFault {
        review_id: String,
        fault_type: Option<String>,
    },
    /// Store the vector for a review's current text.
    ReviewEmbedding {
        review_id: String,
        content_hash: u64,
        vector: Vec<f32>,
    },
    /// Overwrite the given aggregate fields; `None` leaves a field as is.
    BusinessStats {
        business_id: String,
        past_businesses: Option<String>,
        best_business: Option<String>,
    },
    /// Drop every stored vector and switch to a new space.
    ResetEmbeddings(EmbeddingSpace),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] std::io::Error),

    #[error("malformed csv: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("vector storage: {0}")]
    Vectors(#[from] VectorStorageError),

    #[error("vector index: {0}")]
    Index(#[from] IndexError),

    #[error("unknown review '{0}'")]
    UnknownReview(String),

    #[error("unknown business '{0}'")]
    UnknownBusiness(String),

    #[error("id '{id}' appears more than once in {table}")]
    DuplicateId { table: &'static str, id: String },

    #[error("no embedding space set; reset embeddings before storing vectors")]
    NoEmbeddingSpace,

    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        use std::io::ErrorKind;
        match self {
            StoreError::Unavailable(e) => matches!(
                e.kind(),
                ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Access to shops, reviews and review vectors.
pub trait RepairStore: Send + Sync {
    /// All shops in store order.
    fn businesses(&self) -> Result<Vec<Business>, StoreError>;

    /// Shops with the given IDs, in store order. Unknown IDs are ignored.
    fn businesses_by_ids(&self, ids: &[String]) -> Result<Vec<Business>, StoreError>;

    /// IDs of shops whose `best_business` equals `category`.
    fn business_ids_by_best_fault(&self, category: &str) -> Result<Vec<String>, StoreError>;

    fn reviews(&self) -> Result<Vec<Review>, StoreError>;

    /// Reviews with no stored vector, or whose text changed since it was stored.
    fn reviews_missing_embedding(&self) -> Result<Vec<Review>, StoreError>;

    /// Space of the stored vectors, `None` if none were ever stored.
    fn embedding_space(&self) -> Result<Option<EmbeddingSpace>, StoreError>;

    /// The `k` reviews whose vectors are closest to `query`, nearest first.
    fn nearest_reviews(&self, query: &[f32], k: usize) -> Result<Vec<ReviewNeighbor>, StoreError>;

    /// Apply every write or none of them.
    fn apply(&self, writes: &[PendingWrite]) -> Result<(), StoreError>;
}

/// Accepts `2018-07-07` and `2018-07-07 22:09:11`; writes the date only.
mod review_date {
    use chrono::{NaiveDate, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer};

    const DATE: &str = "%Y-%m-%d";
    const DATE_TIME: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(date) => s.serialize_str(&date.format(DATE).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        let Some(raw) = raw.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()) else {
            return Ok(None);
        };
        NaiveDate::parse_from_str(&raw, DATE)
            .or_else(|_| NaiveDateTime::parse_from_str(&raw, DATE_TIME).map(|dt| dt.date()))
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}
