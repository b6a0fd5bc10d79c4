use std::sync::Arc;
use std::time::Duration;

use super::support::{business, leading, located, review, seeded, DeadStore, DownEncoder};
use crate::recommend::{
    RecommendError, RecommendRequest, RecommendService, Recommendation, RecommendedShop,
    MAX_RESULTS, NO_RESULTS_MESSAGE,
};
use crate::semantic::hashing::HashEncoder;
use crate::semantic::{EmbeddingIndexBuilder, EmbeddingSpace, Encoder};
use crate::store::{BackendCsv, Business, PendingWrite, RepairStore, RetryPolicy, Review};

fn service(store: BackendCsv, encoder: Arc<dyn Encoder>, max_results: usize) -> RecommendService {
    RecommendService::new(Arc::new(store), encoder, 100, max_results)
}

fn hashing() -> Arc<dyn Encoder> {
    Arc::new(HashEncoder::new(256).unwrap())
}

fn by_category(category: &str) -> RecommendRequest {
    RecommendRequest {
        category: Some(category.to_string()),
        ..Default::default()
    }
}

fn shops(result: Recommendation) -> Vec<RecommendedShop> {
    match result {
        Recommendation::Found { shops } => shops,
        Recommendation::Empty { message } => panic!("expected shops, got '{}'", message),
    }
}

fn ids(shops: &[RecommendedShop]) -> Vec<&str> {
    shops.iter().map(|s| s.business_id.as_str()).collect()
}

fn placed(id: &str, stars: f32, best: &str, lat: f64, lon: f64) -> Business {
    Business {
        best_business: Some(best.to_string()),
        ..located(id, stars, lat, lon)
    }
}

// --- category lookups ---

#[test]
fn category_sorted_by_rating_and_labelled() {
    let (store, _tmp) = seeded(
        &[
            leading("x", 4.5, "brakes"),
            leading("y", 4.8, "brakes"),
            leading("z", 3.0, "brakes"),
            leading("w", 5.0, "engine"),
        ],
        &[],
    );
    let service = service(store, hashing(), MAX_RESULTS);

    let shops = shops(service.recommend(&by_category("Brakes ")).unwrap());
    assert_eq!(ids(&shops), vec!["y", "x", "z"]);
    let labels: Vec<char> = shops.iter().map(|s| s.label).collect();
    assert_eq!(labels, vec!['A', 'B', 'C']);
    assert_eq!(shops[0].rating, 4.8);
    assert_eq!(shops[0].address, "100 Main St, Las Vegas, NV 89101");
    assert_eq!(shops[0].distance_m, None);
}

#[test]
fn unmapped_category_is_empty() {
    let (store, _tmp) = seeded(&[leading("x", 4.5, "brakes")], &[]);
    let service = service(store, hashing(), MAX_RESULTS);

    let result = service.recommend(&by_category("spaceship")).unwrap();
    assert_eq!(
        result,
        Recommendation::Empty {
            message: NO_RESULTS_MESSAGE.to_string()
        }
    );
}

#[test]
fn results_are_capped_and_sorted() {
    let shops_in: Vec<Business> = (0..10)
        .map(|i| leading(&format!("s{}", i), (i % 5) as f32, "tires"))
        .collect();
    let (store, _tmp) = seeded(&shops_in, &[]);
    let service = service(store, hashing(), 50);

    let shops = shops(service.recommend(&by_category("tires")).unwrap());
    assert_eq!(shops.len(), MAX_RESULTS);
    assert!(shops.windows(2).all(|w| w[0].rating >= w[1].rating));
    assert_eq!(shops.last().map(|s| s.label), Some('G'));
}

#[test]
fn equal_ratings_keep_store_order() {
    let (store, _tmp) = seeded(
        &[
            leading("c", 4.0, "brakes"),
            leading("a", 4.0, "brakes"),
            leading("b", 4.0, "brakes"),
        ],
        &[],
    );
    let service = service(store, hashing(), 2);

    let shops = shops(service.recommend(&by_category("brakes")).unwrap());
    assert_eq!(ids(&shops), vec!["c", "a"]);
}

// --- location ---

#[test]
fn nearest_shops_survive_then_sort_by_rating() {
    let (store, _tmp) = seeded(
        &[
            placed("near", 3.0, "brakes", 36.170, -115.150),
            placed("nearer", 4.0, "brakes", 36.171, -115.141),
            placed("far", 5.0, "brakes", 40.0, -100.0),
            leading("nowhere", 5.0, "brakes"),
        ],
        &[],
    );
    let service = service(store, hashing(), 2);

    let shops = shops(
        service
            .recommend(&RecommendRequest {
                user_lat: Some(36.17),
                user_lon: Some(-115.14),
                ..by_category("brakes")
            })
            .unwrap(),
    );

    assert_eq!(ids(&shops), vec!["nearer", "near"]);
    assert!(shops.iter().all(|s| s.distance_m.unwrap() < 2_000.0));
}

#[test]
fn location_without_located_shops_is_empty() {
    let (store, _tmp) = seeded(&[leading("nowhere", 5.0, "brakes")], &[]);
    let service = service(store, hashing(), MAX_RESULTS);

    let result = service
        .recommend(&RecommendRequest {
            user_lat: Some(36.17),
            user_lon: Some(-115.14),
            ..by_category("brakes")
        })
        .unwrap();
    assert!(matches!(result, Recommendation::Empty { .. }));
}

// --- invalid requests ---

#[test]
fn request_needs_category_or_text() {
    let (store, _tmp) = seeded(&[leading("x", 4.5, "brakes")], &[]);
    let service = service(store, hashing(), MAX_RESULTS);

    let blank = RecommendRequest {
        category: Some("  ".to_string()),
        query: Some(String::new()),
        ..Default::default()
    };
    assert!(matches!(
        service.recommend(&blank),
        Err(RecommendError::InvalidRequest(_))
    ));
}

#[test]
fn partial_location_is_rejected() {
    let (store, _tmp) = seeded(&[leading("x", 4.5, "brakes")], &[]);
    let service = service(store, hashing(), MAX_RESULTS);

    let request = RecommendRequest {
        user_lat: Some(36.17),
        ..by_category("brakes")
    };
    assert!(matches!(
        service.recommend(&request),
        Err(RecommendError::InvalidRequest(_))
    ));
}

// --- free text ---

fn embedded_store(reviews: &[Review], businesses: &[Business], encoder: &dyn Encoder) -> (BackendCsv, tempfile::TempDir) {
    let (store, tmp) = seeded(businesses, reviews);
    let retry = RetryPolicy {
        attempts: 1,
        backoff: Duration::ZERO,
    };
    EmbeddingIndexBuilder::new(&store, encoder, 100, retry)
        .run()
        .unwrap();
    (store, tmp)
}

#[test]
fn free_text_finds_shops_with_similar_reviews() {
    let encoder = hashing();
    let (store, _tmp) = embedded_store(
        &[
            review("r1", "a", "brake pads squeal and grind"),
            review("r2", "b", "oil change and engine tune up"),
        ],
        &[business("a", 3.5), business("b", 4.9)],
        encoder.as_ref(),
    );
    let service = RecommendService::new(Arc::new(store), encoder, 1, MAX_RESULTS);

    let request = RecommendRequest {
        query: Some("my brakes squealing, pads worn".to_string()),
        ..Default::default()
    };
    let shops = shops(service.recommend(&request).unwrap());
    assert_eq!(ids(&shops), vec!["a"]);
}

#[test]
fn free_text_without_vectors_is_empty() {
    let (store, _tmp) = seeded(&[business("a", 3.5)], &[review("r1", "a", "brakes")]);
    let service = service(store, hashing(), MAX_RESULTS);

    let request = RecommendRequest {
        query: Some("brakes".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        service.recommend(&request).unwrap(),
        Recommendation::Empty { .. }
    ));
}

fn store_with_down_space() -> (BackendCsv, tempfile::TempDir) {
    let (store, tmp) = seeded(&[leading("x", 4.5, "brakes")], &[review("r1", "x", "brakes")]);
    store
        .apply(&[PendingWrite::ResetEmbeddings(EmbeddingSpace::of(&DownEncoder))])
        .unwrap();
    (store, tmp)
}

#[test]
fn encoder_failure_falls_back_to_category() {
    let (store, _tmp) = store_with_down_space();
    let service = service(store, Arc::new(DownEncoder), MAX_RESULTS);

    let request = RecommendRequest {
        query: Some("squeaky stopping".to_string()),
        ..by_category("brakes")
    };
    assert_eq!(ids(&shops(service.recommend(&request).unwrap())), vec!["x"]);
}

#[test]
fn encoder_failure_without_category_is_an_error() {
    let (store, _tmp) = store_with_down_space();
    let service = service(store, Arc::new(DownEncoder), MAX_RESULTS);

    let request = RecommendRequest {
        query: Some("squeaky stopping".to_string()),
        ..Default::default()
    };
    let err = service.recommend(&request).unwrap_err();
    assert!(matches!(err, RecommendError::EmbeddingServiceFailure(_)));
    assert!(!err.user_message().contains("model unavailable"));
}

// --- storage ---

#[test]
fn dead_store_is_reported() {
    let service = RecommendService::new(Arc::new(DeadStore), hashing(), 100, MAX_RESULTS);

    assert!(matches!(
        service.recommend(&by_category("brakes")),
        Err(RecommendError::StorageUnavailable(_))
    ));
    assert!(matches!(
        service.list_fault_categories(),
        Err(RecommendError::StorageUnavailable(_))
    ));
}

#[test]
fn categories_skip_unknown_and_repeat() {
    let (store, _tmp) = seeded(
        &[
            leading("a", 4.0, "engine"),
            leading("b", 4.0, "brakes"),
            leading("c", 4.0, "engine"),
            leading("d", 4.0, "unknown"),
            business("e", 4.0),
        ],
        &[],
    );
    let service = service(store, hashing(), MAX_RESULTS);

    assert_eq!(service.list_fault_categories().unwrap(), vec!["brakes", "engine"]);
}
