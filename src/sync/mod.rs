//! Per-run sync building blocks: listing entry filtering and the error taxonomy.
pub mod error;
pub mod filter;

pub use error::SyncError;
pub use filter::{classify_entry, EntryStatus};
