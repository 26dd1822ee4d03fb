//! Storefront capability seam. The sync engine only knows [`CatalogSource`];
//! the PlayStation Store client is one implementation of it.
use async_trait::async_trait;
use psstore_client::{ItemDetail, ListingPage, PsError, PsStoreClient};

#[async_trait]
pub trait CatalogSource: Send + Sync {
    fn name(&self) -> &'static str;
    /// Full listing for a library URL, rate limited between the count and data requests.
    async fn fetch_listing(&self, library_url: &str) -> Result<ListingPage, PsError>;
    async fn fetch_item_detail(&self, detail_url: &str) -> Result<ItemDetail, PsError>;
}

#[async_trait]
impl CatalogSource for PsStoreClient {
    fn name(&self) -> &'static str {
        "psstore"
    }

    async fn fetch_listing(&self, library_url: &str) -> Result<ListingPage, PsError> {
        PsStoreClient::fetch_listing(self, library_url).await
    }

    async fn fetch_item_detail(&self, detail_url: &str) -> Result<ItemDetail, PsError> {
        PsStoreClient::fetch_item_detail(self, detail_url).await
    }
}
