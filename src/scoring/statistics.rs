use crate::config::ScoringConfig;

/// Rating mean and population standard deviation of one library.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LibraryStats {
    pub mean: f64,
    pub stdev: f64,
}

impl LibraryStats {
    pub fn from_ratings(ratings: &[f64], cfg: &ScoringConfig) -> Self {
        Self {
            mean: compute_mean(ratings, cfg),
            stdev: compute_stdev(ratings, cfg),
        }
    }

    /// Stdev safe to divide by: a zero (or non-finite) stdev falls back to the configured default.
    pub fn divisor_stdev(&self, cfg: &ScoringConfig) -> f64 {
        if self.stdev.is_finite() && self.stdev.abs() > f64::EPSILON {
            self.stdev
        } else {
            cfg.default_stdev
        }
    }
}

/// Arithmetic mean; the configured default for an empty library.
pub fn compute_mean(ratings: &[f64], cfg: &ScoringConfig) -> f64 {
    if ratings.is_empty() {
        return cfg.default_mean;
    }
    ratings.iter().sum::<f64>() / ratings.len() as f64
}

/// Population standard deviation (divides by N); the configured default for an empty library.
pub fn compute_stdev(ratings: &[f64], cfg: &ScoringConfig) -> f64 {
    if ratings.is_empty() {
        return cfg.default_stdev;
    }
    let n = ratings.len() as f64;
    let mean = ratings.iter().sum::<f64>() / n;
    let variance = ratings.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}
