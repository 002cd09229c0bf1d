//! Collection lifecycle: create, replace, list, and delete.
//!
//! Replacing or deleting a collection is destructive. Callers are expected to
//! keep regular reads and writes on that collection out of the way while it
//! runs; no cross-process lock is taken.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{DocStoreError, Result};
use crate::index::IndexInfo;
use crate::store::DocumentStore;

/// Longest accepted collection name. Keeps derived table and index names
/// within PostgreSQL's 63-byte identifier limit.
pub const MAX_COLLECTION_NAME_LEN: usize = 32;

/// Check that `name` can be used as a collection name.
///
/// Names are ASCII letters, digits and `_`, start with a letter or `_`, and are
/// at most [`MAX_COLLECTION_NAME_LEN`] characters long.
///
/// # Errors
///
/// Returns [`DocStoreError::ValidationError`] describing the problem.
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DocStoreError::ValidationError("collection name is empty".to_string()));
    }
    if name.len() > MAX_COLLECTION_NAME_LEN {
        return Err(DocStoreError::ValidationError(format!(
            "collection name '{name}' is longer than {MAX_COLLECTION_NAME_LEN} characters"
        )));
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(DocStoreError::ValidationError(format!(
            "collection name '{name}' must not start with a digit"
        )));
    }
    if let Some(bad) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(DocStoreError::ValidationError(format!(
            "collection name '{name}' contains invalid character {bad:?}"
        )));
    }
    Ok(())
}

/// Summary of one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Collection name.
    pub name: String,
    /// Fixed embedding dimension.
    pub dimension: usize,
    /// Number of stored records.
    pub record_count: usize,
    /// The collection's index.
    pub index: IndexInfo,
}

impl DocumentStore {
    /// Create a collection sized for this store's embedding provider.
    ///
    /// With `replace`, an existing collection of that name is deleted first.
    /// Without it, an existing collection with the same dimension is left as is.
    ///
    /// # Errors
    ///
    /// Returns [`DocStoreError::ValidationError`] for an invalid name and
    /// [`DocStoreError::ConflictError`] if the collection exists with a different
    /// dimension and `replace` is `false`.
    pub async fn create_collection(&self, name: &str, replace: bool) -> Result<()> {
        validate_collection_name(name)?;
        let dimensions = self.embedding_provider().dimensions();

        if let Some(existing) = self.vector_store().collection_dimension(name).await? {
            if replace {
                self.delete_collection(name).await?;
            } else if existing == dimensions {
                return Ok(());
            } else {
                return Err(DocStoreError::ConflictError(format!(
                    "collection '{name}' exists with dimension {existing}, \
                     embedding provider produces {dimensions}"
                )));
            }
        }

        self.vector_store().create_collection(name, dimensions).await.inspect_err(|e| {
            error!(collection = name, error = %e, "failed to create collection");
        })?;
        info!(collection = name, dimensions, replace, "created collection");
        Ok(())
    }

    /// Create (or replace) a collection and make it this handle's target.
    pub async fn set_collection(&mut self, name: &str, replace: bool) -> Result<()> {
        self.create_collection(name, replace).await?;
        self.collection = name.to_string();
        Ok(())
    }

    /// A handle sharing this store's backend that targets another collection.
    ///
    /// The collection is not created until it is first written to or
    /// explicitly created.
    pub fn with_collection(&self, name: &str) -> Result<Self> {
        validate_collection_name(name)?;
        let mut handle = self.clone();
        handle.collection = name.to_string();
        Ok(handle)
    }

    /// Names of the store's collections.
    ///
    /// With `include_empty = false`, only collections holding at least one
    /// record are returned.
    pub async fn list_collections(&self, include_empty: bool) -> Result<Vec<String>> {
        let names = self.vector_store().list_collections().await?;
        if include_empty {
            return Ok(names);
        }
        let mut populated = Vec::with_capacity(names.len());
        for name in names {
            if self.vector_store().has_records(&name).await? {
                populated.push(name);
            }
        }
        Ok(populated)
    }

    /// Delete a collection and its index. Deleting a missing collection succeeds.
    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        validate_collection_name(name)?;
        self.vector_store().delete_collection(name).await.inspect_err(|e| {
            error!(collection = name, error = %e, "failed to delete collection");
        })?;
        info!(collection = name, "deleted collection");
        Ok(())
    }

    /// Delete every collection whose name starts with `prefix`.
    ///
    /// Nothing is deleted unless `confirm` is `true`. Returns the number of
    /// collections deleted.
    pub async fn clear_all_collections(&self, confirm: bool, prefix: &str) -> Result<usize> {
        if !confirm {
            warn!(prefix, "not deleting collections; pass confirm = true to proceed");
            return Ok(0);
        }
        let mut deleted = 0;
        for name in self.vector_store().list_collections().await? {
            if name.starts_with(prefix) {
                self.delete_collection(&name).await?;
                deleted += 1;
            }
        }
        warn!(deleted, prefix, "deleted collections");
        Ok(deleted)
    }

    /// Delete every collection that holds no records. Returns the count.
    pub async fn clear_empty_collections(&self) -> Result<usize> {
        let mut deleted = 0;
        for name in self.vector_store().list_collections().await? {
            if !self.vector_store().has_records(&name).await? {
                self.delete_collection(&name).await?;
                deleted += 1;
            }
        }
        warn!(deleted, "deleted empty collections");
        Ok(deleted)
    }

    /// Describe a collection.
    ///
    /// # Errors
    ///
    /// Returns [`DocStoreError::NotFoundError`] if the collection does not exist.
    pub async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let dimension = self
            .vector_store()
            .collection_dimension(name)
            .await?
            .ok_or_else(|| DocStoreError::missing_collection(name))?;
        let record_count = self.vector_store().count(name).await?;
        let index = self.vector_store().index_info(name).await?;
        Ok(CollectionInfo { name: name.to_string(), dimension, record_count, index })
    }
}
