//! Vector document store for ADK-Rust.
//!
//! This crate provides:
//! - Documents with structured metadata and deterministic, metadata-derived ids
//! - Named collections with a fixed embedding dimension
//! - Batch ingestion through a pluggable [`EmbeddingProvider`]
//! - Top-k similarity search with JSON containment metadata filters
//! - An HNSW index lifecycle per collection (`NoIndex`, `Building`, `Ready`)
//!
//! Storage goes through the [`VectorStore`] trait. [`InMemoryVectorStore`] is
//! always available; the `pgvector` feature adds a PostgreSQL backend.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use adk_docstore::{Document, DocumentStore, InMemoryVectorStore};
//!
//! let store = DocumentStore::builder()
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .open()
//!     .await?;
//!
//! store.add_documents(&[Document::from_string("Rust is fast", "notes", false)]).await?;
//! let hits = store.similar_texts("speed", 3, None).await?;
//! ```

pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod identity;
pub mod index;
pub mod inmemory;
pub mod registry;
pub mod store;
pub mod vectorstore;

#[cfg(feature = "pgvector")]
pub mod pgvector;

pub use config::{DocStoreConfig, DocStoreConfigBuilder, PgConnectionConfig};
pub use document::{DocMetaData, Document, RESERVED_FIELDS, SearchResult, StoredRecord};
pub use embedding::EmbeddingProvider;
pub use error::{DocStoreError, Result};
pub use filter::MetadataFilter;
pub use identity::{derive_id, document_id};
pub use index::{DistanceMetric, EnsureOutcome, IndexInfo, IndexParams, IndexState, index_name};
pub use inmemory::InMemoryVectorStore;
pub use registry::{CollectionInfo, MAX_COLLECTION_NAME_LEN, validate_collection_name};
pub use store::{DocumentStore, DocumentStoreBuilder};
pub use vectorstore::{BackendCapabilities, VectorStore};

#[cfg(feature = "pgvector")]
pub use pgvector::PgVectorStore;
