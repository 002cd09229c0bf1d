//! ANN index descriptors and lifecycle.
//!
//! Every collection has at most one HNSW-style index over its embeddings. Its
//! lifecycle is `NoIndex → Building → Ready`, and `Ready → NoIndex` on drop.
//! Index parameters are fixed when the index is built; changing them means
//! dropping and rebuilding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::store::DocumentStore;

/// The distance function used to rank embeddings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine distance; score is `1 - distance`.
    #[default]
    Cosine,
    /// Negative inner product; score is the inner product.
    InnerProduct,
    /// Euclidean distance; score is `1 / (1 + distance)`.
    L2,
}

impl DistanceMetric {
    /// Similarity score between two embeddings (higher is more similar).
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(a, b),
            Self::InnerProduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            Self::L2 => {
                let distance: f32 =
                    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt();
                1.0 / (1.0 + distance)
            }
        }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Build parameters of a graph-based ANN index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexParams {
    /// Distance function the index is built for.
    pub metric: DistanceMetric,
    /// Graph connectivity (HNSW `m`).
    pub m: usize,
    /// Candidate list size during construction (HNSW `ef_construction`).
    pub ef_construction: usize,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self { metric: DistanceMetric::Cosine, m: 16, ef_construction: 200 }
    }
}

/// Where a collection's index is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    /// No index exists.
    NoIndex,
    /// The index exists but is still being built.
    Building,
    /// The index is built and usable.
    Ready,
}

/// Descriptor of a collection's index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Index name, derived from the collection's table name.
    pub name: String,
    /// Current lifecycle state.
    pub state: IndexState,
    /// Parameters the index was built with, when known.
    pub params: Option<IndexParams>,
    /// When the index was built, if the backend records it.
    pub built_at: Option<DateTime<Utc>>,
}

impl IndexInfo {
    pub(crate) fn absent(name: String) -> Self {
        Self { name, state: IndexState::NoIndex, params: None, built_at: None }
    }
}

/// Result of [`DocumentStore::ensure_index`].
#[derive(Debug, Clone, PartialEq)]
pub enum EnsureOutcome {
    /// The index did not exist and was built by this call.
    Created(IndexInfo),
    /// The index already existed; nothing was changed.
    AlreadyPresent(IndexInfo),
}

impl EnsureOutcome {
    /// The index descriptor after the call.
    pub fn info(&self) -> &IndexInfo {
        match self {
            Self::Created(info) | Self::AlreadyPresent(info) => info,
        }
    }

    /// Returns `true` if this call built the index.
    pub fn created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Name of the index over a table's `embedding` column.
pub fn index_name(table: &str) -> String {
    format!("hnsw_index_{table}_embedding")
}

impl DocumentStore {
    /// Build the collection's index unless it already exists.
    ///
    /// Uses the [`IndexParams`] from this store's configuration. Calling this on
    /// a collection whose index is present is a no-op and leaves the existing
    /// descriptor untouched.
    ///
    /// # Errors
    ///
    /// Returns [`DocStoreError::NotFoundError`](crate::DocStoreError::NotFoundError) if the
    /// collection does not exist, or a backend error if the build fails.
    pub async fn ensure_index(&self, collection: &str) -> Result<EnsureOutcome> {
        let outcome =
            self.vector_store().ensure_index(collection, &self.config().index).await.inspect_err(
                |e| error!(collection, error = %e, "failed to ensure index"),
            )?;
        match &outcome {
            EnsureOutcome::Created(info) => {
                if !self.vector_store().capabilities().concurrent_index_build {
                    warn!(
                        collection,
                        index = %info.name,
                        backend = self.vector_store().name(),
                        "index built while holding the collection write lock"
                    );
                }
                info!(collection, index = %info.name, "created index");
            }
            EnsureOutcome::AlreadyPresent(info) => {
                debug!(
                    collection,
                    index = %info.name,
                    state = ?info.state,
                    "index already present"
                );
            }
        }
        Ok(outcome)
    }

    /// Drop the collection's index. Succeeds if there is none.
    pub async fn drop_index(&self, collection: &str) -> Result<()> {
        self.vector_store()
            .drop_index(collection)
            .await
            .inspect_err(|e| error!(collection, error = %e, "failed to drop index"))?;
        info!(collection, "dropped index");
        Ok(())
    }

    /// Describe the collection's index.
    pub async fn index_info(&self, collection: &str) -> Result<IndexInfo> {
        self.vector_store().index_info(collection).await
    }
}
