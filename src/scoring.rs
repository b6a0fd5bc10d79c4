//! Composite shop score per fault category.
//!
//! `score = ln(1 + repairs) * rating`: experience with a fault grows the
//! score with diminishing returns, scaled by the shop's overall rating.

use std::collections::HashMap;

use serde::Serialize;

use crate::store::{Business, Review};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShopScore {
    pub business_id: String,
    pub name: String,
    pub fault_type: String,
    pub repair_count: u64,
    pub rating: f32,
    pub score: f64,
}

/// Scores for every (shop, category) pair with at least one classified
/// review, best first. Ties go to business id, then category.
///
/// `category` restricts the listing to one fault type; `limit` truncates.
pub fn composite_scores(
    businesses: &[Business],
    reviews: &[Review],
    category: Option<&str>,
    limit: Option<usize>,
) -> Vec<ShopScore> {
    let by_id: HashMap<&str, &Business> = businesses
        .iter()
        .map(|b| (b.business_id.as_str(), b))
        .collect();

    let mut repairs: HashMap<(&str, &str), u64> = HashMap::new();
    for review in reviews {
        let Some(fault) = review.fault_type.as_deref().filter(|f| !f.is_empty()) else {
            continue;
        };
        if category.is_some_and(|c| c != fault) {
            continue;
        }
        *repairs.entry((review.business_id.as_str(), fault)).or_default() += 1;
    }

    let mut scores: Vec<ShopScore> = repairs
        .into_iter()
        .filter_map(|((business_id, fault), count)| {
            let business = by_id.get(business_id)?;
            Some(ShopScore {
                business_id: business_id.to_string(),
                name: business.name.clone(),
                fault_type: fault.to_string(),
                repair_count: count,
                rating: business.stars,
                score: (count as f64).ln_1p() * business.stars as f64,
            })
        })
        .collect();

    scores.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.business_id.cmp(&b.business_id))
            .then_with(|| a.fault_type.cmp(&b.fault_type))
    });
    if let Some(limit) = limit {
        scores.truncate(limit);
    }
    scores
}
