//! Thumbnail storage collaborator. The catalog only keeps the reference string
//! returned by the store.
use async_trait::async_trait;

#[async_trait]
pub trait ThumbnailStore: Send + Sync {
    /// Copy the image at `source_url` into storage and return its reference URL.
    async fn store(&self, source_url: &str) -> anyhow::Result<String>;
}

/// Keeps the storefront URL as the stored reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughThumbnails;

#[async_trait]
impl ThumbnailStore for PassthroughThumbnails {
    async fn store(&self, source_url: &str) -> anyhow::Result<String> {
        url::Url::parse(source_url)?;
        Ok(source_url.to_string())
    }
}
