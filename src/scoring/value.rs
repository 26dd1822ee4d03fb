//! Weighted rating and value score.
//!
//! The weighted rating rewards items that sit above the library mean (and
//! punishes those below it) in proportion to their deviation, then shifts the
//! result by the number of ratings. The value score is rating per currency
//! unit, boosted by the tier discount for above-mean items and damped by it
//! for the rest.
use crate::config::ScoringConfig;

use super::discount::DiscountInfo;
use super::statistics::LibraryStats;

/// Pricing context a value score is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Base,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scores {
    pub weighted_rating: f64,
    pub base_value_score: i64,
    pub plus_value_score: i64,
}

/// Store rating with 0/missing replaced by the configured default.
pub fn normalize_rating(raw: Option<f64>, cfg: &ScoringConfig) -> f64 {
    match raw {
        Some(r) if r.is_finite() && r != 0.0 => r,
        _ => cfg.default_rating,
    }
}

pub fn normalize_rating_count(raw: Option<i64>, cfg: &ScoringConfig) -> i64 {
    match raw {
        Some(c) if c != 0 => c,
        _ => cfg.default_rating_count,
    }
}

pub fn rating_above_mean(rating: f64, stats: &LibraryStats) -> bool {
    rating - stats.mean > 0.0
}

/// Ties go to the even neighbour, so `round_to(0.125, 2)` is `0.12`.
fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round_ties_even() / factor
}

pub fn weighted_rating(
    rating: f64,
    rating_count: i64,
    stats: &LibraryStats,
    cfg: &ScoringConfig,
) -> f64 {
    let deviation = rating - stats.mean;
    let above_mean = deviation > 0.0;
    let count_weight = rating_count as f64 / cfg.rating_count_weighting;

    let sign = if above_mean { 1.0 } else { -1.0 };
    let deviation_factor = sign + deviation / stats.divisor_stdev(cfg);
    let rating_value = round_to(rating * deviation_factor, 2);

    let weighted = if above_mean {
        rating_value + count_weight
    } else {
        rating_value - count_weight
    };

    if weighted == 0.0 {
        cfg.default_weighted_rating
    } else {
        weighted
    }
}

/// Integer value score for one tier. `above_mean` must come from the same
/// rating/mean pair the weighted rating was derived from.
pub fn value_score(
    weighted_rating: f64,
    above_mean: bool,
    discounts: &DiscountInfo,
    tier: Tier,
    cfg: &ScoringConfig,
) -> i64 {
    let price = discounts.price(tier);
    let price = if price > 0 { price } else { cfg.minimum_price } as f64;

    let discount_weight = 1.0 + discounts.rate(tier) as f64 / 100.0;
    let effective_rating = if above_mean {
        weighted_rating * discount_weight * 100.0
    } else {
        weighted_rating / discount_weight * 100.0
    };

    (1.0 / (price / effective_rating) * 100.0).round_ties_even() as i64
}

/// Weighted rating plus both tier value scores for one item.
pub fn score_item(
    rating: f64,
    rating_count: i64,
    discounts: &DiscountInfo,
    stats: &LibraryStats,
    cfg: &ScoringConfig,
) -> Scores {
    let weighted = weighted_rating(rating, rating_count, stats, cfg);
    let above_mean = rating_above_mean(rating, stats);
    Scores {
        weighted_rating: weighted,
        base_value_score: value_score(weighted, above_mean, discounts, Tier::Base, cfg),
        plus_value_score: value_score(weighted, above_mean, discounts, Tier::Plus, cfg),
    }
}
