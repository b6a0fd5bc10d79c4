//! Classification backfill: assign a fault category to every review.

use rayon::prelude::*;
use serde::Serialize;

use crate::classifier::FaultClassifier;
use crate::store::{PendingWrite, RepairStore, RetryPolicy, StoreError, WriteBatch};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassifyReport {
    /// Reviews that matched a category
    pub matched: usize,
    /// Reviews that matched nothing
    pub unmatched: usize,
    /// Reviews whose stored category changed
    pub updated: usize,
}

/// Classify all reviews and store categories that changed.
///
/// Classification is pure per review, so it runs in parallel; writes are
/// committed in batches afterwards.
pub fn classify_reviews(
    store: &dyn RepairStore,
    classifier: &FaultClassifier,
    batch_size: usize,
    retry: RetryPolicy,
) -> Result<ClassifyReport, StoreError> {
    let reviews = store.reviews()?;
    log::info!("Classifying {} reviews", reviews.len());

    let faults: Vec<Option<&str>> = reviews
        .par_iter()
        .map(|review| classifier.classify(&review.text))
        .collect();

    let mut report = ClassifyReport::default();
    let mut batch = WriteBatch::new(store, batch_size, retry);

    for (review, fault) in reviews.iter().zip(faults) {
        match fault {
            Some(_) => report.matched += 1,
            None => report.unmatched += 1,
        }
        if review.fault_type.as_deref() != fault {
            batch.push(PendingWrite::ReviewFault {
                review_id: review.review_id.clone(),
                fault_type: fault.map(str::to_string),
            })?;
            report.updated += 1;
        }
    }

    batch.finish()?;

    log::info!(
        "Classification done: {} matched, {} unmatched, {} updated",
        report.matched,
        report.unmatched,
        report.updated
    );
    Ok(report)
}
