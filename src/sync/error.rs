use psstore_client::PsError;
use thiserror::Error;

use crate::database_ops::catalog::CatalogError;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Network, HTTP status or payload decoding failure against the storefront.
    #[error("store fetch failed: {0}")]
    Fetch(#[from] PsError),
    /// Pre-orders can stay listed past their release date without a price block.
    #[error("item {item_id} has no price block")]
    MissingPriceBlock { item_id: String },
    #[error(transparent)]
    Persistence(#[from] CatalogError),
    #[error("thumbnail upload failed: {0}")]
    Thumbnail(anyhow::Error),
    #[error("listing entry {entry_id} is invalid: {reason}")]
    InvalidEntry { entry_id: String, reason: String },
    #[error("library {0} not found")]
    LibraryNotFound(i64),
}

impl SyncError {
    /// Known-benign storefront inconsistencies: skipped quietly, not reported as failures.
    pub fn is_expected_skip(&self) -> bool {
        matches!(self, SyncError::MissingPriceBlock { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_missing_price_block_is_an_expected_skip() {
        assert!(SyncError::MissingPriceBlock { item_id: "EP0700".into() }.is_expected_skip());
        assert!(!SyncError::LibraryNotFound(1).is_expected_skip());
        assert!(!SyncError::Thumbnail(anyhow::anyhow!("cdn down")).is_expected_skip());
        assert!(!SyncError::Persistence(CatalogError::ItemNotFound(3)).is_expected_skip());
    }
}
