//! Vector store trait implemented by each backing engine.

use async_trait::async_trait;

use crate::document::StoredRecord;
use crate::error::Result;
use crate::filter::MetadataFilter;
use crate::index::{DistanceMetric, EnsureOutcome, IndexInfo, IndexParams};

/// Guarantees that differ between backing engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// A failed [`VectorStore::upsert`] leaves none of the batch behind.
    pub atomic_batch_upsert: bool,
    /// Index builds do not block concurrent reads and writes.
    pub concurrent_index_build: bool,
    /// Records written after the index build are visible to similarity search
    /// without another [`VectorStore::ensure_index`] call.
    pub maintains_index_on_write: bool,
}

/// A storage backend for documents, their embeddings, and an ANN index per
/// collection.
///
/// Every collection-scoped method returns
/// [`DocStoreError::NotFoundError`](crate::DocStoreError::NotFoundError) when the
/// collection does not exist, except the lifecycle methods documented as
/// idempotent.
///
/// # Example
///
/// ```rust,ignore
/// use adk_docstore::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 384).await?;
/// store.upsert("docs", &records).await?;
/// let hits = store.search("docs", &query_embedding, 5, None, DistanceMetric::Cosine).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Per-backend guarantees.
    fn capabilities(&self) -> BackendCapabilities;

    /// The embedding dimension of a collection, or `None` if it does not exist.
    async fn collection_dimension(&self, name: &str) -> Result<Option<usize>>;

    /// Create a named collection. No-op if it already exists.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Drop a collection's index and then the collection. No-op if absent.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Names of all collections, sorted.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Whether the collection holds at least one record, without scanning it.
    async fn has_records(&self, collection: &str) -> Result<bool>;

    /// Number of records in the collection.
    async fn count(&self, collection: &str) -> Result<usize>;

    /// Insert or overwrite records by id. Embeddings must match the collection
    /// dimension.
    async fn upsert(&self, collection: &str, records: &[StoredRecord]) -> Result<()>;

    /// Delete records by id. Unknown ids are ignored.
    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()>;

    /// All records, optionally restricted to those matching `filter`.
    async fn get_all(
        &self,
        collection: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<StoredRecord>>;

    /// Records for `ids`, in the order of `ids`. Unknown ids are skipped and an
    /// id listed twice yields its record twice.
    async fn get_by_ids(&self, collection: &str, ids: &[String]) -> Result<Vec<StoredRecord>>;

    /// The `top_k` records closest to `embedding` among those matching
    /// `filter`, with their similarity scores in descending order.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
        metric: DistanceMetric,
    ) -> Result<Vec<(StoredRecord, f32)>>;

    /// Build the collection's index unless one with the same name exists.
    async fn ensure_index(&self, collection: &str, params: &IndexParams) -> Result<EnsureOutcome>;

    /// Drop the collection's index. No-op if absent.
    async fn drop_index(&self, collection: &str) -> Result<()>;

    /// Describe the collection's index.
    async fn index_info(&self, collection: &str) -> Result<IndexInfo>;
}
