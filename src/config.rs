//! Runtime configuration, loaded from the environment with per-key defaults.
use std::time::Duration;

use psstore_client::PsConfig;
use tracing::warn;

use crate::util::env::{env_opt, env_parse};

/// Tunables of the weighted-rating and value-score formulas.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    /// Rating count is divided by this before being added to (or taken off) the rating.
    pub rating_count_weighting: f64,
    /// Used when the store reports a rating of 0 or none at all.
    pub default_rating: f64,
    pub default_rating_count: i64,
    /// Used when the weighted rating works out to exactly zero.
    pub default_weighted_rating: f64,
    /// Used for free items so the value division stays finite.
    pub minimum_price: i64,
    /// Library statistics before any item has been rated.
    pub default_mean: f64,
    pub default_stdev: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            rating_count_weighting: 125.0,
            default_rating: 1.0,
            default_rating_count: 0,
            default_weighted_rating: 1.0,
            minimum_price: 1,
            default_mean: 4.44,
            default_stdev: 0.354,
        }
    }
}

impl ScoringConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let cfg = Self {
            rating_count_weighting: env_parse(
                "SCORE_RATING_COUNT_WEIGHTING",
                d.rating_count_weighting,
            ),
            default_rating: env_parse("SCORE_DEFAULT_RATING", d.default_rating),
            default_rating_count: env_parse("SCORE_DEFAULT_RATING_COUNT", d.default_rating_count),
            default_weighted_rating: env_parse(
                "SCORE_DEFAULT_WEIGHTED_RATING",
                d.default_weighted_rating,
            ),
            minimum_price: env_parse("SCORE_MIN_PRICE", d.minimum_price),
            default_mean: env_parse("STATS_DEFAULT_MEAN", d.default_mean),
            default_stdev: env_parse("STATS_DEFAULT_STDEV", d.default_stdev),
        };
        cfg.sanitized()
    }

    /// Replace values that would reintroduce a division by zero with the defaults.
    fn sanitized(mut self) -> Self {
        let d = Self::default();
        if !(self.rating_count_weighting.is_finite() && self.rating_count_weighting > 0.0) {
            warn!(value = self.rating_count_weighting, "SCORE_RATING_COUNT_WEIGHTING must be > 0");
            self.rating_count_weighting = d.rating_count_weighting;
        }
        if self.minimum_price <= 0 {
            warn!(value = self.minimum_price, "SCORE_MIN_PRICE must be > 0");
            self.minimum_price = d.minimum_price;
        }
        if !(self.default_stdev.is_finite() && self.default_stdev > 0.0) {
            warn!(value = self.default_stdev, "STATS_DEFAULT_STDEV must be > 0");
            self.default_stdev = d.default_stdev;
        }
        if self.default_rating <= 0.0 {
            warn!(value = self.default_rating, "SCORE_DEFAULT_RATING must be > 0");
            self.default_rating = d.default_rating;
        }
        if self.default_weighted_rating == 0.0 {
            self.default_weighted_rating = d.default_weighted_rating;
        }
        self
    }
}

/// Courtesy pauses towards the storefront.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleConfig {
    /// Between the listing count request and the full listing request.
    pub listing_spacing: Duration,
    /// After every item detail request.
    pub item_spacing: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            listing_spacing: Duration::from_secs(5),
            item_spacing: Duration::from_secs(2),
        }
    }
}

impl ThrottleConfig {
    pub fn none() -> Self {
        Self {
            listing_spacing: Duration::ZERO,
            item_spacing: Duration::ZERO,
        }
    }

    /// Production runs may slow down but never go below the default spacing.
    pub fn with_production_floor(self) -> Self {
        let floor = Self::default();
        let mut out = self;
        if out.listing_spacing < floor.listing_spacing {
            warn!(
                configured_ms = out.listing_spacing.as_millis() as u64,
                floor_ms = floor.listing_spacing.as_millis() as u64,
                "listing spacing below production floor; raising"
            );
            out.listing_spacing = floor.listing_spacing;
        }
        if out.item_spacing < floor.item_spacing {
            warn!(
                configured_ms = out.item_spacing.as_millis() as u64,
                floor_ms = floor.item_spacing.as_millis() as u64,
                "item spacing below production floor; raising"
            );
            out.item_spacing = floor.item_spacing;
        }
        out
    }
}

/// Retry policy for storefront fetches, applied by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Extra attempts after the first one.
    pub retries: u32,
    pub base_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 2,
            base_backoff: Duration::from_millis(2000),
        }
    }
}

impl RetryConfig {
    pub fn none() -> Self {
        Self {
            retries: 0,
            base_backoff: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub scoring: ScoringConfig,
    pub throttle: ThrottleConfig,
    pub retry: RetryConfig,
    pub request_timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            throttle: ThrottleConfig::default(),
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let d = ThrottleConfig::default();
        let production = env_opt("APP_ENV")
            .map(|v| v.trim().eq_ignore_ascii_case("production"))
            .unwrap_or(false);
        let throttle = ThrottleConfig {
            listing_spacing: env_secs("PSN_LISTING_SPACING_SECS", d.listing_spacing),
            item_spacing: env_secs("PSN_ITEM_SPACING_SECS", d.item_spacing),
        };
        Self {
            scoring: ScoringConfig::from_env(),
            throttle: if production {
                throttle.with_production_floor()
            } else {
                throttle
            },
            retry: RetryConfig {
                retries: env_parse("PSN_FETCH_RETRIES", 2u32),
                base_backoff: Duration::from_millis(env_parse("PSN_RETRY_BACKOFF_MS", 2000u64)),
            },
            request_timeout: Duration::from_secs(env_parse("PSN_HTTP_TIMEOUT_SECS", 30u64).max(1)),
            user_agent: env_opt("PSN_STORE_UA"),
        }
    }

    /// Client settings for the PlayStation Store source.
    pub fn store_config(&self) -> PsConfig {
        let mut cfg = PsConfig {
            listing_spacing: self.throttle.listing_spacing,
            request_timeout: self.request_timeout,
            ..PsConfig::default()
        };
        if let Some(ua) = &self.user_agent {
            cfg.user_agent = ua.clone();
        }
        cfg
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    let secs: f64 = env_parse(key, default.as_secs_f64());
    if secs.is_finite() && secs >= 0.0 {
        Duration::from_secs_f64(secs.min(86_400.0))
    } else {
        warn!(env_key = key, secs, "spacing must be a non-negative number of seconds");
        default
    }
}
