//! Fixtures shared by the integration-style tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::semantic::{EmbeddingError, EmbeddingSpace, Encoder};
use crate::store::{
    BackendCsv, Business, PendingWrite, RepairStore, Review, ReviewNeighbor, StoreError,
};

pub fn business(id: &str, stars: f32) -> Business {
    Business {
        business_id: id.to_string(),
        name: format!("Shop {}", id),
        address: "100 Main St".to_string(),
        city: "Las Vegas".to_string(),
        state: "NV".to_string(),
        postal_code: "89101".to_string(),
        latitude: None,
        longitude: None,
        stars,
        review_count: 0,
        past_businesses: None,
        best_business: None,
    }
}

pub fn located(id: &str, stars: f32, lat: f64, lon: f64) -> Business {
    Business {
        latitude: Some(lat),
        longitude: Some(lon),
        ..business(id, stars)
    }
}

pub fn leading(id: &str, stars: f32, best: &str) -> Business {
    Business {
        best_business: Some(best.to_string()),
        ..business(id, stars)
    }
}

pub fn review(id: &str, business_id: &str, text: &str) -> Review {
    Review {
        review_id: id.to_string(),
        business_id: business_id.to_string(),
        stars: Some(4.0),
        text: text.to_string(),
        date: None,
        fault_type: None,
    }
}

pub fn seeded(businesses: &[Business], reviews: &[Review]) -> (BackendCsv, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let store = BackendCsv::seed(tmp.path(), businesses, reviews).unwrap();
    (store, tmp)
}

/// Encoder with canned vectors per text; unknown text fails.
pub struct StubEncoder {
    name: String,
    dimensions: usize,
    vectors: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
}

impl StubEncoder {
    pub fn new(name: &str, dimensions: usize) -> Self {
        Self {
            name: name.to_string(),
            dimensions,
            vectors: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Encoder for StubEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed(format!("no vector for '{}'", text)))
    }
}

/// Encoder whose model never loads.
pub struct DownEncoder;

impl Encoder for DownEncoder {
    fn name(&self) -> &str {
        "down"
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn encode(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::InitFailed("model unavailable".to_string()))
    }
}

/// Wraps a store and makes the first `failures` calls to `apply` fail.
pub struct FlakyStore<S> {
    pub inner: S,
    failures: Mutex<usize>,
    kind: std::io::ErrorKind,
    pub attempts: AtomicUsize,
}

impl<S: RepairStore> FlakyStore<S> {
    pub fn new(inner: S, failures: usize, kind: std::io::ErrorKind) -> Self {
        Self {
            inner,
            failures: Mutex::new(failures),
            kind,
            attempts: AtomicUsize::new(0),
        }
    }
}

impl<S: RepairStore> RepairStore for FlakyStore<S> {
    fn businesses(&self) -> Result<Vec<Business>, StoreError> {
        self.inner.businesses()
    }

    fn businesses_by_ids(&self, ids: &[String]) -> Result<Vec<Business>, StoreError> {
        self.inner.businesses_by_ids(ids)
    }

    fn business_ids_by_best_fault(&self, category: &str) -> Result<Vec<String>, StoreError> {
        self.inner.business_ids_by_best_fault(category)
    }

    fn reviews(&self) -> Result<Vec<Review>, StoreError> {
        self.inner.reviews()
    }

    fn reviews_missing_embedding(&self) -> Result<Vec<Review>, StoreError> {
        self.inner.reviews_missing_embedding()
    }

    fn embedding_space(&self) -> Result<Option<EmbeddingSpace>, StoreError> {
        self.inner.embedding_space()
    }

    fn nearest_reviews(&self, query: &[f32], k: usize) -> Result<Vec<ReviewNeighbor>, StoreError> {
        self.inner.nearest_reviews(query, k)
    }

    fn apply(&self, writes: &[PendingWrite]) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(StoreError::Unavailable(std::io::Error::new(self.kind, "flaky disk")));
        }
        self.inner.apply(writes)
    }
}

/// A store whose reads all fail.
pub struct DeadStore;

impl RepairStore for DeadStore {
    fn businesses(&self) -> Result<Vec<Business>, StoreError> {
        Err(dead())
    }

    fn businesses_by_ids(&self, _ids: &[String]) -> Result<Vec<Business>, StoreError> {
        Err(dead())
    }

    fn business_ids_by_best_fault(&self, _category: &str) -> Result<Vec<String>, StoreError> {
        Err(dead())
    }

    fn reviews(&self) -> Result<Vec<Review>, StoreError> {
        Err(dead())
    }

    fn reviews_missing_embedding(&self) -> Result<Vec<Review>, StoreError> {
        Err(dead())
    }

    fn embedding_space(&self) -> Result<Option<EmbeddingSpace>, StoreError> {
        Err(dead())
    }

    fn nearest_reviews(&self, _query: &[f32], _k: usize) -> Result<Vec<ReviewNeighbor>, StoreError> {
        Err(dead())
    }

    fn apply(&self, _writes: &[PendingWrite]) -> Result<(), StoreError> {
        Err(dead())
    }
}

fn dead() -> StoreError {
    StoreError::Unavailable(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "store offline",
    ))
}
