//! Query-time recommendation: candidate resolution, geo cut, rating sort.
//!
//! A request names a fault category, describes the problem in free text, or
//! both. Candidates come from shops whose `best_business` is the category,
//! or from shops whose reviews read like the description. With the user's
//! coordinates, the nearest candidates survive the cut; otherwise the best
//! rated do. The survivors are sorted by rating and labelled A, B, C...

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::geo::GeoPoint;
use crate::semantic::{EmbeddingError, Encoder, SimilarityError, SimilarityRecommender};
use crate::store::{Business, RepairStore, StoreError, UNKNOWN};

/// Upper bound on returned shops.
pub const MAX_RESULTS: usize = 7;

pub const NO_RESULTS_MESSAGE: &str =
    "No matching businesses found. Please try another fault part or description.";

const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong while looking for shops. Please try again later.";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecommendRequest {
    pub category: Option<String>,
    pub query: Option<String>,
    pub user_lat: Option<f64>,
    pub user_lon: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendedShop {
    pub label: char,
    pub business_id: String,
    pub name: String,
    pub rating: f32,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Metres from the user, when coordinates were given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Recommendation {
    Found { shops: Vec<RecommendedShop> },
    Empty { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),

    #[error("embedding service failure: {0}")]
    EmbeddingServiceFailure(#[from] EmbeddingError),
}

impl RecommendError {
    /// Message safe to show an end user.
    pub fn user_message(&self) -> String {
        match self {
            RecommendError::InvalidRequest(reason) => reason.clone(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

impl From<SimilarityError> for RecommendError {
    fn from(err: SimilarityError) -> Self {
        match err {
            SimilarityError::Embedding(e) => RecommendError::EmbeddingServiceFailure(e),
            SimilarityError::Store(e) => RecommendError::StorageUnavailable(e),
        }
    }
}

pub struct RecommendService {
    store: Arc<dyn RepairStore>,
    encoder: Arc<dyn Encoder>,
    similarity_k: usize,
    max_results: usize,
}

impl RecommendService {
    pub fn new(
        store: Arc<dyn RepairStore>,
        encoder: Arc<dyn Encoder>,
        similarity_k: usize,
        max_results: usize,
    ) -> Self {
        Self {
            store,
            encoder,
            similarity_k,
            max_results: max_results.clamp(1, MAX_RESULTS),
        }
    }

    /// Categories that currently lead at least one shop, sorted.
    pub fn list_fault_categories(&self) -> Result<Vec<String>, RecommendError> {
        let categories: BTreeSet<String> = self
            .store
            .businesses()?
            .into_iter()
            .filter_map(|b| b.best_business)
            .filter(|c| !c.is_empty() && c != UNKNOWN)
            .collect();
        Ok(categories.into_iter().collect())
    }

    pub fn recommend(&self, request: &RecommendRequest) -> Result<Recommendation, RecommendError> {
        let category = non_blank(&request.category).map(|c| c.to_lowercase());
        let query = non_blank(&request.query);
        let origin = user_location(request.user_lat, request.user_lon)?;

        if category.is_none() && query.is_none() {
            return Err(RecommendError::InvalidRequest(
                "Please choose a fault part or describe the problem.".to_string(),
            ));
        }

        let candidates = self.resolve_candidates(category.as_deref(), query)?;
        if candidates.is_empty() {
            log::debug!("no candidates for {:?}", request);
            return Ok(Recommendation::Empty {
                message: NO_RESULTS_MESSAGE.to_string(),
            });
        }

        let shops = match origin {
            Some(origin) => self.nearest_then_rated(&candidates, &origin)?,
            None => self.top_rated(&candidates)?,
        };

        if shops.is_empty() {
            return Ok(Recommendation::Empty {
                message: NO_RESULTS_MESSAGE.to_string(),
            });
        }

        Ok(Recommendation::Found {
            shops: label(shops),
        })
    }

    /// Free text first; a category, if given, backs up a failed encoder.
    fn resolve_candidates(
        &self,
        category: Option<&str>,
        query: Option<&str>,
    ) -> Result<Vec<String>, RecommendError> {
        let Some(query) = query else {
            return self.by_category(category.unwrap_or_default());
        };

        let similar = SimilarityRecommender::new(self.store.as_ref(), self.encoder.as_ref(), self.similarity_k);
        match similar.candidates(query) {
            Ok(ids) => Ok(ids.into_iter().collect()),
            Err(SimilarityError::Embedding(err)) => match category {
                Some(category) => {
                    log::warn!("similarity search failed ({}), using category '{}'", err, category);
                    self.by_category(category)
                }
                None => Err(RecommendError::EmbeddingServiceFailure(err)),
            },
            Err(err) => Err(err.into()),
        }
    }

    fn by_category(&self, category: &str) -> Result<Vec<String>, RecommendError> {
        Ok(self.store.business_ids_by_best_fault(category)?)
    }

    /// Nearest `max_results` candidates with known coordinates, then by rating.
    fn nearest_then_rated(
        &self,
        candidates: &[String],
        origin: &GeoPoint,
    ) -> Result<Vec<(Business, Option<f64>)>, RecommendError> {
        let mut located: Vec<(Business, Option<f64>)> = self
            .store
            .businesses_by_ids(candidates)?
            .into_iter()
            .filter_map(|b| {
                let point = GeoPoint::new(b.latitude?, b.longitude?)?;
                let distance = origin.distance_m(&point);
                Some((b, Some(distance)))
            })
            .collect();

        located.sort_by(|a, b| {
            a.1.unwrap_or_default()
                .total_cmp(&b.1.unwrap_or_default())
                .then_with(|| a.0.business_id.cmp(&b.0.business_id))
        });
        located.truncate(self.max_results);
        located.sort_by(|a, b| b.0.stars.total_cmp(&a.0.stars));

        Ok(located)
    }

    /// Best rated `max_results` candidates; equal ratings keep store order.
    fn top_rated(&self, candidates: &[String]) -> Result<Vec<(Business, Option<f64>)>, RecommendError> {
        let mut details = self.store.businesses_by_ids(candidates)?;
        details.sort_by(|a, b| b.stars.total_cmp(&a.stars));
        details.truncate(self.max_results);
        Ok(details.into_iter().map(|b| (b, None)).collect())
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn user_location(lat: Option<f64>, lon: Option<f64>) -> Result<Option<GeoPoint>, RecommendError> {
    match (lat, lon) {
        (None, None) => Ok(None),
        (Some(lat), Some(lon)) => GeoPoint::new(lat, lon).map(Some).ok_or_else(|| {
            RecommendError::InvalidRequest(format!(
                "Location ({}, {}) is out of range.",
                lat, lon
            ))
        }),
        _ => Err(RecommendError::InvalidRequest(
            "Both latitude and longitude are needed to sort by distance.".to_string(),
        )),
    }
}

fn label(shops: Vec<(Business, Option<f64>)>) -> Vec<RecommendedShop> {
    shops
        .into_iter()
        .zip('A'..='Z')
        .map(|((b, distance_m), label)| RecommendedShop {
            label,
            address: format_address(&b),
            business_id: b.business_id,
            name: b.name,
            rating: b.stars,
            latitude: b.latitude,
            longitude: b.longitude,
            distance_m,
        })
        .collect()
}

fn format_address(b: &Business) -> String {
    let region = [b.state.as_str(), b.postal_code.as_str()]
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    [b.address.as_str(), b.city.as_str(), region.as_str()]
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}
