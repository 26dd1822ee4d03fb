//! Library statistics, discount extraction and the weighted-rating/value formulas.
pub mod discount;
pub mod statistics;
pub mod value;

pub use discount::DiscountInfo;
pub use statistics::{compute_mean, compute_stdev, LibraryStats};
pub use value::{score_item, Scores, Tier};
