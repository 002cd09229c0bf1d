//! In-memory vector store using exact (brute-force) search.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by a
//! `HashMap` protected by a `tokio::sync::RwLock`. It is suitable for
//! development, testing, and small-scale use cases.
//!
//! Search scans every record, so results are exact and newly written records
//! are visible immediately. The per-collection index is a descriptor that
//! tracks the `NoIndex → Ready` lifecycle; building it updates that descriptor
//! under the store's write lock, which briefly blocks other callers.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::StoredRecord;
use crate::error::{DocStoreError, Result};
use crate::filter::MetadataFilter;
use crate::index::{DistanceMetric, EnsureOutcome, IndexInfo, IndexParams, IndexState, index_name};
use crate::vectorstore::{BackendCapabilities, VectorStore};

const BACKEND: &str = "InMemory";

#[derive(Debug)]
struct Collection {
    dimensions: usize,
    records: HashMap<String, StoredRecord>,
    index: Option<BuiltIndex>,
}

#[derive(Debug, Clone, Copy)]
struct BuiltIndex {
    params: IndexParams,
    built_at: DateTime<Utc>,
}

impl Collection {
    fn index_info(&self, name: &str) -> IndexInfo {
        match self.index {
            Some(index) => IndexInfo {
                name: index_name(name),
                state: IndexState::Ready,
                params: Some(index.params),
                built_at: Some(index.built_at),
            },
            None => IndexInfo::absent(index_name(name)),
        }
    }
}

/// An in-memory vector store.
///
/// Collections are stored as nested `HashMap`s: collection name → record ID → record.
/// All operations are async-safe via `tokio::sync::RwLock`.
///
/// # Example
///
/// ```rust,ignore
/// use adk_docstore::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 384).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(name: &str) -> DocStoreError {
    DocStoreError::missing_collection(name)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        BACKEND
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            atomic_batch_upsert: true,
            concurrent_index_build: false,
            maintains_index_on_write: true,
        }
    }

    async fn collection_dimension(&self, name: &str) -> Result<Option<usize>> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).map(|c| c.dimensions))
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_insert_with(|| {
            debug!(collection = name, dimensions, "created in-memory collection");
            Collection { dimensions, records: HashMap::new(), index: None }
        });
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.remove(name).is_some() {
            debug!(collection = name, "deleted in-memory collection");
        }
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn has_records(&self, collection: &str) -> Result<bool> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(!store.records.is_empty())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(store.records.len())
    }

    async fn upsert(&self, collection: &str, records: &[StoredRecord]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;

        // Check the whole batch before touching the map.
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != store.dimensions) {
            return Err(DocStoreError::ValidationError(format!(
                "record '{}' has {} dimensions, collection '{collection}' expects {}",
                bad.id,
                bad.embedding.len(),
                store.dimensions
            )));
        }
        for record in records {
            store.records.insert(record.id.clone(), record.clone());
        }
        debug!(collection, count = records.len(), "upserted records in memory");
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        for id in ids {
            store.records.remove(*id);
        }
        Ok(())
    }

    async fn get_all(
        &self,
        collection: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<StoredRecord>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(store
            .records
            .values()
            .filter(|r| filter.is_none_or(|f| f.matches(&r.metadata)))
            .cloned()
            .collect())
    }

    async fn get_by_ids(&self, collection: &str, ids: &[String]) -> Result<Vec<StoredRecord>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(ids.iter().filter_map(|id| store.records.get(id).cloned()).collect())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
        metric: DistanceMetric,
    ) -> Result<Vec<(StoredRecord, f32)>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;

        let mut scored: Vec<(&StoredRecord, f32)> = store
            .records
            .values()
            .filter(|r| filter.is_none_or(|f| f.matches(&r.metadata)))
            .map(|r| (r, metric.score(&r.embedding, embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored.into_iter().map(|(r, score)| (r.clone(), score)).collect())
    }

    async fn ensure_index(&self, collection: &str, params: &IndexParams) -> Result<EnsureOutcome> {
        {
            let collections = self.collections.read().await;
            let store = collections.get(collection).ok_or_else(|| missing(collection))?;
            if store.index.is_some() {
                return Ok(EnsureOutcome::AlreadyPresent(store.index_info(collection)));
            }
        }

        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        // Another caller may have built it between the two locks.
        if store.index.is_some() {
            return Ok(EnsureOutcome::AlreadyPresent(store.index_info(collection)));
        }
        store.index = Some(BuiltIndex { params: *params, built_at: Utc::now() });
        debug!(
            collection,
            m = params.m,
            ef_construction = params.ef_construction,
            "built in-memory index"
        );
        Ok(EnsureOutcome::Created(store.index_info(collection)))
    }

    async fn drop_index(&self, collection: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        if let Some(store) = collections.get_mut(collection) {
            store.index = None;
        }
        Ok(())
    }

    async fn index_info(&self, collection: &str) -> Result<IndexInfo> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(store.index_info(collection))
    }
}
