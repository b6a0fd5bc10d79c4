//! Seasonal fault trends.
//!
//! Classified reviews are counted per fault category and calendar quarter.
//! A category's quarter ratio is its count in that quarter over its average
//! quarterly count, so 1.0 means a typical quarter and 2.0 twice as busy.

use std::collections::BTreeMap;

use chrono::Datelike;
use serde::Serialize;

use crate::store::Review;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonalTip {
    /// 1 to 4
    pub quarter: u32,
    pub fault_type: String,
    pub count: u64,
    pub ratio: f64,
}

/// Per category, review counts for quarters 1..=4. Reviews without a date
/// or category are ignored.
pub fn quarterly_counts(reviews: &[Review]) -> BTreeMap<String, [u64; 4]> {
    let mut counts: BTreeMap<String, [u64; 4]> = BTreeMap::new();
    for review in reviews {
        let (Some(fault), Some(date)) = (review.fault_type.as_deref(), review.date) else {
            continue;
        };
        if fault.is_empty() {
            continue;
        }
        let quarter = (date.month0() / 3) as usize;
        counts.entry(fault.to_string()).or_default()[quarter] += 1;
    }
    counts
}

/// The `top` categories with the highest ratio in each quarter, quarter by
/// quarter. Ties go to the smaller category id; quarters with no reviews
/// contribute nothing.
pub fn seasonal_tips(reviews: &[Review], top: usize) -> Vec<SeasonalTip> {
    let counts = quarterly_counts(reviews);

    (0..4)
        .flat_map(|q| {
            let mut ranked: Vec<SeasonalTip> = counts
                .iter()
                .filter(|(_, quarters)| quarters[q] > 0)
                .map(|(fault, quarters)| {
                    let average = quarters.iter().sum::<u64>() as f64 / 4.0;
                    SeasonalTip {
                        quarter: q as u32 + 1,
                        fault_type: fault.clone(),
                        count: quarters[q],
                        ratio: quarters[q] as f64 / average,
                    }
                })
                .collect();
            // BTreeMap iteration is already sorted by id, so a stable sort keeps ties in id order
            ranked.sort_by(|a, b| b.ratio.total_cmp(&a.ratio));
            ranked.truncate(top);
            ranked
        })
        .collect()
}
