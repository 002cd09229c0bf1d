//! The document store handle.
//!
//! [`DocumentStore`] ties an [`EmbeddingProvider`] to a [`VectorStore`]
//! backend. It assigns document ids, computes embeddings, validates input
//! before anything is written, and translates caller filters.
//!
//! A handle carries the name of the collection it targets. Handles are cheap to
//! clone and safe to share across tasks; use
//! [`with_collection`](DocumentStore::with_collection) to work with several
//! collections of one backend at once.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use adk_docstore::{DocumentStore, DocStoreConfig, InMemoryVectorStore, Document};
//!
//! let store = DocumentStore::builder()
//!     .config(DocStoreConfig::builder().collection_name("docs").build()?)
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .open()
//!     .await?;
//!
//! let ids = store.add_documents(&documents).await?;
//! let hits = store.similar_texts("search query", 5, Some(r#"{"tag": "faq"}"#)).await?;
//! ```

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::DocStoreConfig;
use crate::document::{Document, SearchResult, StoredRecord};
use crate::embedding::EmbeddingProvider;
use crate::error::{DocStoreError, Result};
use crate::filter::MetadataFilter;
use crate::identity::document_id;
use crate::index::IndexState;
use crate::vectorstore::VectorStore;

/// A handle to a vector document store, bound to one collection.
#[derive(Clone)]
pub struct DocumentStore {
    pub(crate) config: Arc<DocStoreConfig>,
    pub(crate) collection: String,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("collection", &self.collection)
            .field("backend", &self.vector_store.name())
            .field("embedding_provider", &self.embedding_provider.name())
            .finish()
    }
}

impl DocumentStore {
    /// Create a new [`DocumentStoreBuilder`].
    pub fn builder() -> DocumentStoreBuilder {
        DocumentStoreBuilder::default()
    }

    /// The collection this handle targets.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Return a reference to the store configuration.
    pub fn config(&self) -> &DocStoreConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector store backend.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Store documents in the current collection, creating it if needed.
    ///
    /// Every document gets a derived id (see [`document_id`]); documents whose
    /// derived id already exists overwrite the stored record. An empty
    /// `metadata.id` is allowed here and replaced by a derived one. All
    /// metadata is validated and all embeddings are computed before anything
    /// is written, so a validation or embedding failure leaves the collection
    /// untouched.
    ///
    /// Returns the stored ids in input order.
    ///
    /// # Errors
    ///
    /// - [`DocStoreError::ValidationError`] for empty required metadata or an
    ///   embedding of the wrong length
    /// - [`DocStoreError::EmbeddingError`] if the provider fails or returns the
    ///   wrong number of vectors
    /// - backend errors from the upsert; see [`BackendCapabilities`](crate::BackendCapabilities)
    ///   for whether a failed batch can leave partial writes
    pub async fn add_documents(&self, documents: &[Document]) -> Result<Vec<String>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let collection = self.collection.as_str();

        // A missing or unusable id is replaced before validation, so only the
        // other required fields can fail here.
        let mut prepared = Vec::with_capacity(documents.len());
        for document in documents {
            let id = document_id(document);
            let mut metadata = document.metadata.clone();
            metadata.id.clone_from(&id);
            metadata.validate().inspect_err(|e| {
                error!(collection, document.id = %id, error = %e, "invalid document");
            })?;
            prepared.push((id, metadata.to_value()));
        }

        let dimensions = match self.vector_store.collection_dimension(collection).await? {
            Some(existing) => existing,
            None => self.embedding_provider.dimensions(),
        };

        let texts: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
        let embeddings = self.embed_texts(&texts, dimensions).await?;

        let records: Vec<StoredRecord> = prepared
            .into_iter()
            .zip(documents)
            .zip(embeddings)
            .map(|(((id, metadata), document), embedding)| StoredRecord {
                id,
                embedding,
                content: document.content.clone(),
                metadata,
            })
            .collect();

        // Collections come into existence on first write.
        self.vector_store.create_collection(collection, dimensions).await?;
        self.vector_store.upsert(collection, &records).await.inspect_err(|e| {
            error!(collection, count = records.len(), error = %e, "upsert failed");
        })?;

        info!(collection, count = records.len(), "added documents");
        Ok(records.into_iter().map(|r| r.id).collect())
    }

    /// Embed `texts` in batches, checking count and dimension of the result.
    async fn embed_texts(&self, texts: &[&str], dimensions: usize) -> Result<Vec<Vec<f32>>> {
        let provider = self.embedding_provider.name();
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.config.embedding_batch_size) {
            let vectors = self.embedding_provider.embed_batch(batch).await.inspect_err(|e| {
                error!(provider, batch_size = batch.len(), error = %e, "embedding failed");
            })?;
            if vectors.len() != batch.len() {
                return Err(DocStoreError::EmbeddingError {
                    provider: provider.to_string(),
                    message: format!(
                        "returned {} embeddings for {} texts",
                        vectors.len(),
                        batch.len()
                    ),
                });
            }
            embeddings.extend(vectors);
        }

        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimensions) {
            return Err(DocStoreError::ValidationError(format!(
                "embedding has {} dimensions, collection '{}' expects {dimensions}",
                bad.len(),
                self.collection
            )));
        }
        Ok(embeddings)
    }

    /// Every document in the current collection, optionally filtered.
    ///
    /// `filter` is a JSON object; see [`MetadataFilter`] for its semantics.
    /// Results come back in storage order.
    ///
    /// # Errors
    ///
    /// Returns [`DocStoreError::FilterError`] for a malformed filter and
    /// [`DocStoreError::NotFoundError`] if the collection does not exist.
    pub async fn get_all_documents(&self, filter: Option<&str>) -> Result<Vec<Document>> {
        let filter = self.parse_filter(filter)?;
        let records = self
            .vector_store
            .get_all(&self.collection, filter.as_ref())
            .await
            .inspect_err(|e| error!(collection = %self.collection, error = %e, "scan failed"))?;
        self.to_documents(records)
    }

    /// Documents for `ids`, in the same order as `ids`.
    ///
    /// Unknown ids are skipped. An id listed more than once yields its
    /// document once per occurrence.
    pub async fn get_documents_by_ids(&self, ids: &[String]) -> Result<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = self
            .vector_store
            .get_by_ids(&self.collection, ids)
            .await
            .inspect_err(|e| error!(collection = %self.collection, error = %e, "lookup failed"))?;
        debug!(
            collection = %self.collection,
            requested = ids.len(),
            found = records.len(),
            "looked up documents"
        );
        self.to_documents(records)
    }

    /// The `k` documents most similar to `query`, best first.
    ///
    /// With a filter, only matching documents are ranked, so up to `k`
    /// matching documents are returned even when non-matching ones are closer.
    /// Builds the collection's index first if it has none.
    ///
    /// # Errors
    ///
    /// Returns [`DocStoreError::FilterError`] for a malformed filter (checked
    /// before the query is embedded), [`DocStoreError::NotFoundError`] if the
    /// collection does not exist, and embedding or backend errors otherwise.
    pub async fn similar_texts(
        &self,
        query: &str,
        k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        let filter = self.parse_filter(filter)?;
        let collection = self.collection.as_str();

        let dimensions = self
            .vector_store
            .collection_dimension(collection)
            .await?
            .ok_or_else(|| DocStoreError::missing_collection(collection))?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedding_provider.embed(query).await.inspect_err(|e| {
            error!(collection, error = %e, "query embedding failed");
        })?;
        if embedding.len() != dimensions {
            return Err(DocStoreError::ValidationError(format!(
                "query embedding has {} dimensions, collection '{collection}' expects {dimensions}",
                embedding.len()
            )));
        }

        if self.vector_store.index_info(collection).await?.state == IndexState::NoIndex {
            debug!(collection, "no index before search, building one");
            self.ensure_index(collection).await?;
        }

        let hits = self
            .vector_store
            .search(collection, &embedding, k, filter.as_ref(), self.config.index.metric)
            .await
            .inspect_err(|e| error!(collection, error = %e, "vector store search failed"))?;

        let results = hits
            .into_iter()
            .map(|(record, score)| {
                let document = record.into_document(self.vector_store.name())?;
                Ok(SearchResult { document, score })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            collection,
            k,
            result_count = results.len(),
            filtered = filter.is_some(),
            "query completed"
        );
        Ok(results)
    }

    /// Delete documents from the current collection by id.
    pub async fn delete_documents(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        self.vector_store.delete(&self.collection, &ids).await?;
        info!(collection = %self.collection, count = ids.len(), "deleted documents");
        Ok(())
    }

    /// Number of documents in the current collection.
    pub async fn count(&self) -> Result<usize> {
        self.vector_store.count(&self.collection).await
    }

    /// Whether the current collection holds no documents.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(!self.vector_store.has_records(&self.collection).await?)
    }

    fn parse_filter(&self, filter: Option<&str>) -> Result<Option<MetadataFilter>> {
        MetadataFilter::parse_optional(filter).inspect_err(|e| {
            error!(collection = %self.collection, error = %e, "rejected filter");
        })
    }

    fn to_documents(&self, records: Vec<StoredRecord>) -> Result<Vec<Document>> {
        records.into_iter().map(|r| r.into_document(self.vector_store.name())).collect()
    }
}

/// Builder for constructing a [`DocumentStore`].
///
/// The embedding provider and vector store are required; the configuration
/// defaults to [`DocStoreConfig::default()`].
///
/// # Example
///
/// ```rust,ignore
/// let store = DocumentStore::builder()
///     .embedding_provider(Arc::new(embedder))
///     .vector_store(Arc::new(store))
///     .build()?;
/// ```
#[derive(Default)]
pub struct DocumentStoreBuilder {
    config: Option<DocStoreConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
}

impl DocumentStoreBuilder {
    /// Set the store configuration.
    pub fn config(mut self, config: DocStoreConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Build the [`DocumentStore`] without touching the backend.
    ///
    /// # Errors
    ///
    /// Returns [`DocStoreError::ConfigError`] if a required part is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<DocumentStore> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| {
                DocStoreError::ConfigError("embedding_provider is required".to_string())
            })?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| DocStoreError::ConfigError("vector_store is required".to_string()))?;

        Ok(DocumentStore {
            collection: config.collection_name.clone(),
            config: Arc::new(config),
            embedding_provider,
            vector_store,
        })
    }

    /// Build the store and create its configured collection, replacing it
    /// first if [`DocStoreConfig::replace_collection`] is set.
    pub async fn open(self) -> Result<DocumentStore> {
        let store = self.build()?;
        store.create_collection(&store.collection, store.config.replace_collection).await?;
        Ok(store)
    }
}
