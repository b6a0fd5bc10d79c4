//! Per-shop fault statistics.
//!
//! From classified reviews, every shop gets a tally of how often each fault
//! category came up (`past_businesses`, e.g. `brakes(3),engine(1)`) and the
//! category it handled most (`best_business`). Shops with no classified
//! review get `unknown` for both.
//!
//! Results are merged into the store field by field: a field is written only
//! when the fresh value differs from the stored one, so a rerun over an
//! unchanged corpus writes nothing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::store::{
    Business, PendingWrite, RepairStore, RetryPolicy, Review, StoreError, WriteBatch, UNKNOWN,
};
use crate::taxonomy::Taxonomy;

/// Order of categories in the tally, which also decides `best_business`
/// among categories with equal counts: the first one listed wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Category identifiers sorted ascending
    #[default]
    Alphabetical,
    /// Declared taxonomy order; categories unknown to the taxonomy go last,
    /// alphabetically
    TaxonomyOrder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessStats {
    pub business_id: String,
    pub past_businesses: String,
    pub best_business: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub updated: usize,
    pub unchanged: usize,
}

/// Compute stats for every shop in `businesses`.
pub fn compute_stats(
    businesses: &[Business],
    reviews: &[Review],
    tie_break: TieBreak,
    taxonomy: &Taxonomy,
) -> Vec<BusinessStats> {
    let mut counts: HashMap<&str, HashMap<&str, usize>> = HashMap::new();
    for review in reviews {
        let Some(fault) = review.fault_type.as_deref().filter(|f| !f.is_empty()) else {
            continue;
        };
        *counts
            .entry(review.business_id.as_str())
            .or_default()
            .entry(fault)
            .or_default() += 1;
    }

    businesses
        .iter()
        .map(|business| {
            let business_id = business.business_id.clone();
            let Some(faults) = counts.get(business.business_id.as_str()) else {
                return BusinessStats {
                    business_id,
                    past_businesses: UNKNOWN.to_string(),
                    best_business: UNKNOWN.to_string(),
                };
            };

            let mut tally: Vec<(&str, usize)> = faults.iter().map(|(f, c)| (*f, *c)).collect();
            match tie_break {
                TieBreak::Alphabetical => tally.sort_by(|a, b| a.0.cmp(b.0)),
                TieBreak::TaxonomyOrder => tally.sort_by(|a, b| {
                    let pa = taxonomy.position(a.0).unwrap_or(usize::MAX);
                    let pb = taxonomy.position(b.0).unwrap_or(usize::MAX);
                    pa.cmp(&pb).then_with(|| a.0.cmp(b.0))
                }),
            }

            let mut best = tally[0];
            for entry in &tally[1..] {
                if entry.1 > best.1 {
                    best = *entry;
                }
            }

            BusinessStats {
                business_id,
                past_businesses: tally
                    .iter()
                    .map(|(fault, count)| format!("{}({})", fault, count))
                    .collect::<Vec<_>>()
                    .join(","),
                best_business: best.0.to_string(),
            }
        })
        .collect()
}

/// Writes needed to bring `businesses` in line with `stats`.
///
/// Only differing fields are carried; shops already up to date yield nothing.
pub fn diff_stats(businesses: &[Business], stats: &[BusinessStats]) -> Vec<PendingWrite> {
    let stored: HashMap<&str, &Business> = businesses
        .iter()
        .map(|b| (b.business_id.as_str(), b))
        .collect();

    stats
        .iter()
        .filter_map(|fresh| {
            let current = stored.get(fresh.business_id.as_str())?;
            let past = (current.past_businesses.as_deref() != Some(fresh.past_businesses.as_str()))
                .then(|| fresh.past_businesses.clone());
            let best = (current.best_business.as_deref() != Some(fresh.best_business.as_str()))
                .then(|| fresh.best_business.clone());
            if past.is_none() && best.is_none() {
                return None;
            }
            Some(PendingWrite::BusinessStats {
                business_id: fresh.business_id.clone(),
                past_businesses: past,
                best_business: best,
            })
        })
        .collect()
}

/// Batch job: recompute stats from the store and merge them back.
pub struct StatsAggregator<'a> {
    store: &'a dyn RepairStore,
    taxonomy: &'a Taxonomy,
    tie_break: TieBreak,
    batch_size: usize,
    retry: RetryPolicy,
}

impl<'a> StatsAggregator<'a> {
    pub fn new(
        store: &'a dyn RepairStore,
        taxonomy: &'a Taxonomy,
        tie_break: TieBreak,
        batch_size: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            taxonomy,
            tie_break,
            batch_size,
            retry,
        }
    }

    pub fn run(&self) -> Result<MergeReport, StoreError> {
        let businesses = self.store.businesses()?;
        let reviews = self.store.reviews()?;

        let stats = compute_stats(&businesses, &reviews, self.tie_break, self.taxonomy);
        let writes = diff_stats(&businesses, &stats);

        let report = MergeReport {
            updated: writes.len(),
            unchanged: businesses.len() - writes.len(),
        };

        let mut batch = WriteBatch::new(self.store, self.batch_size, self.retry);
        for write in writes {
            batch.push(write)?;
        }
        batch.finish()?;

        log::info!(
            "Business stats: {} updated, {} unchanged",
            report.updated,
            report.unchanged
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn business(id: &str) -> Business {
        Business {
            business_id: id.to_string(),
            name: format!("Shop {}", id),
            address: String::new(),
            city: String::new(),
            state: String::new(),
            postal_code: String::new(),
            latitude: None,
            longitude: None,
            stars: 4.0,
            review_count: 0,
            past_businesses: None,
            best_business: None,
        }
    }

    fn review(business_id: &str, n: usize, fault: Option<&str>) -> Review {
        Review {
            review_id: format!("{}-{}", business_id, n),
            business_id: business_id.to_string(),
            stars: None,
            text: String::new(),
            date: None,
            fault_type: fault.map(str::to_string),
        }
    }

    fn reviews(business_id: &str, faults: &[&str]) -> Vec<Review> {
        faults
            .iter()
            .enumerate()
            .map(|(n, f)| review(business_id, n, Some(f)))
            .collect()
    }

    #[test]
    fn test_brakes_majority_scenario() {
        let reviews = reviews("B", &["brakes", "engine", "brakes", "brakes"]);
        let stats = compute_stats(&[business("B")], &reviews, TieBreak::Alphabetical, &Taxonomy::default());

        assert_eq!(stats[0].best_business, "brakes");
        assert_eq!(stats[0].past_businesses, "brakes(3),engine(1)");
    }

    #[test]
    fn test_unclassified_business_is_unknown() {
        let mut reviews = reviews("A", &["engine"]);
        reviews.push(review("B", 0, None));
        let stats = compute_stats(
            &[business("A"), business("B")],
            &reviews,
            TieBreak::Alphabetical,
            &Taxonomy::default(),
        );

        assert_eq!(stats[1].business_id, "B");
        assert_eq!(stats[1].best_business, UNKNOWN);
        assert_eq!(stats[1].past_businesses, UNKNOWN);
    }

    #[test]
    fn test_tie_break_policies() {
        let reviews = reviews("B", &["engine", "brakes", "engine", "brakes"]);
        let taxonomy = Taxonomy::default();

        let alpha = compute_stats(&[business("B")], &reviews, TieBreak::Alphabetical, &taxonomy);
        assert_eq!(alpha[0].best_business, "brakes");
        assert_eq!(alpha[0].past_businesses, "brakes(2),engine(2)");

        // engine is declared before brakes
        let ordered = compute_stats(&[business("B")], &reviews, TieBreak::TaxonomyOrder, &taxonomy);
        assert_eq!(ordered[0].best_business, "engine");
        assert_eq!(ordered[0].past_businesses, "engine(2),brakes(2)");
    }

    #[test]
    fn test_diff_carries_only_changed_fields() {
        let mut stored = business("B");
        stored.past_businesses = Some("brakes(2)".to_string());
        stored.best_business = Some("brakes".to_string());

        let fresh = BusinessStats {
            business_id: "B".to_string(),
            past_businesses: "brakes(3)".to_string(),
            best_business: "brakes".to_string(),
        };

        let writes = diff_stats(&[stored.clone()], &[fresh]);
        assert_eq!(
            writes,
            vec![PendingWrite::BusinessStats {
                business_id: "B".to_string(),
                past_businesses: Some("brakes(3)".to_string()),
                best_business: None,
            }]
        );

        let same = BusinessStats {
            business_id: "B".to_string(),
            past_businesses: "brakes(2)".to_string(),
            best_business: "brakes".to_string(),
        };
        assert!(diff_stats(&[stored], &[same]).is_empty());
    }

    #[test]
    fn test_tie_break_deserializes_snake_case() {
        let policy: TieBreak = serde_yml::from_str("taxonomy_order").unwrap();
        assert_eq!(policy, TieBreak::TaxonomyOrder);
    }
}
