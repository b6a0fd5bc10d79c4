use std::time::Duration;

use super::support::{business, review, seeded};
use crate::backfill::classify_reviews;
use crate::classifier::FaultClassifier;
use crate::stats::{StatsAggregator, TieBreak};
use crate::store::{RepairStore, RetryPolicy, UNKNOWN};
use crate::taxonomy::Taxonomy;

fn retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 1,
        backoff: Duration::ZERO,
    }
}

fn corpus() -> (crate::store::BackendCsv, tempfile::TempDir) {
    seeded(
        &[business("b", 4.2), business("quiet", 3.9)],
        &[
            review("r1", "b", "Replaced my brake pads in an hour."),
            review("r2", "b", "Brakes were grinding, now silent."),
            review("r3", "b", "Engine light came on, they fixed it."),
            review("r4", "b", "The brake rotor was warped."),
            review("r5", "b", "Friendly staff, fair prices."),
            review("r6", "quiet", "Nice waiting room."),
        ],
    )
}

#[test]
fn classify_then_aggregate() {
    let (store, _tmp) = corpus();
    let taxonomy = Taxonomy::default();
    let classifier = FaultClassifier::new(&taxonomy).unwrap();

    let report = classify_reviews(&store, &classifier, 2, retry()).unwrap();
    assert_eq!(report.matched, 4);
    assert_eq!(report.unmatched, 2);
    assert_eq!(report.updated, 4);

    let faults: Vec<Option<String>> = store.reviews().unwrap().into_iter().map(|r| r.fault_type).collect();
    assert_eq!(faults[0].as_deref(), Some("brakes"));
    assert_eq!(faults[2].as_deref(), Some("engine"));
    assert_eq!(faults[4], None);

    let report = StatsAggregator::new(&store, &taxonomy, TieBreak::Alphabetical, 10, retry())
        .run()
        .unwrap();
    assert_eq!(report.updated, 2);

    let businesses = store.businesses().unwrap();
    assert_eq!(businesses[0].best_business.as_deref(), Some("brakes"));
    assert_eq!(businesses[0].past_businesses.as_deref(), Some("brakes(3),engine(1)"));
    assert_eq!(businesses[1].best_business.as_deref(), Some(UNKNOWN));
    assert_eq!(businesses[1].past_businesses.as_deref(), Some(UNKNOWN));
}

#[test]
fn reruns_are_no_ops() {
    let (store, tmp) = corpus();
    let taxonomy = Taxonomy::default();
    let classifier = FaultClassifier::new(&taxonomy).unwrap();

    classify_reviews(&store, &classifier, 100, retry()).unwrap();
    StatsAggregator::new(&store, &taxonomy, TieBreak::Alphabetical, 100, retry())
        .run()
        .unwrap();

    let businesses_csv = std::fs::read_to_string(tmp.path().join("businesses.csv")).unwrap();
    let reviews_csv = std::fs::read_to_string(tmp.path().join("reviews.csv")).unwrap();

    let again = classify_reviews(&store, &classifier, 100, retry()).unwrap();
    assert_eq!(again.updated, 0);
    let again = StatsAggregator::new(&store, &taxonomy, TieBreak::Alphabetical, 100, retry())
        .run()
        .unwrap();
    assert_eq!(again.updated, 0);
    assert_eq!(again.unchanged, 2);

    assert_eq!(std::fs::read_to_string(tmp.path().join("businesses.csv")).unwrap(), businesses_csv);
    assert_eq!(std::fs::read_to_string(tmp.path().join("reviews.csv")).unwrap(), reviews_csv);
}

#[test]
fn changed_taxonomy_clears_stale_categories() {
    let (store, _tmp) = corpus();
    classify_reviews(
        &store,
        &FaultClassifier::new(&Taxonomy::default()).unwrap(),
        100,
        retry(),
    )
    .unwrap();

    let engine_only = Taxonomy::from_json(r#"{"engine": ["engine"]}"#).unwrap();
    let report = classify_reviews(&store, &FaultClassifier::new(&engine_only).unwrap(), 100, retry()).unwrap();

    assert_eq!(report.matched, 1);
    assert_eq!(report.updated, 3);
    let matched: Vec<String> = store
        .reviews()
        .unwrap()
        .into_iter()
        .filter_map(|r| r.fault_type)
        .collect();
    assert_eq!(matched, vec!["engine"]);
}
