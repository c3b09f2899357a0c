use crate::utils::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Where exported tables are written.
pub trait Storage: Send + Sync {
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// One page of raw catalog records, as returned by the search endpoint.
/// Its length is what ends pagination, so non-object records are kept.
pub type CatalogPage = Vec<Value>;

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Catalog identifier, used as the cache key.
    fn resource_id(&self) -> &str;

    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<CatalogPage>;
}

#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch_document(&self, url: &str) -> Result<Vec<u8>>;
}
