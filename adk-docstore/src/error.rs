//! Error types for the `adk-docstore` crate.

use thiserror::Error;

/// Errors that can occur in document store operations.
#[derive(Debug, Error)]
pub enum DocStoreError {
    /// Input failed validation: an empty required metadata field, an embedding
    /// whose length does not match the collection, or an invalid collection name.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A metadata filter could not be parsed or uses an unsupported operator.
    #[error("Invalid filter {filter:?}: {reason}")]
    FilterError {
        /// The filter text as supplied by the caller.
        filter: String,
        /// Why the filter was rejected.
        reason: String,
    },

    /// The collection or index required by the operation does not exist.
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// The operation conflicts with existing state.
    #[error("Conflict: {0}")]
    ConflictError(String),

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },
}

impl DocStoreError {
    /// Returns `true` for errors caused by caller input, including bad filters.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationError(_) | Self::FilterError { .. })
    }

    /// Returns `true` if the error reports a missing collection or index.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFoundError(_))
    }

    pub(crate) fn backend(backend: &str, message: impl Into<String>) -> Self {
        Self::VectorStoreError { backend: backend.to_string(), message: message.into() }
    }

    pub(crate) fn missing_collection(name: &str) -> Self {
        Self::NotFoundError(format!("collection '{name}' does not exist"))
    }
}

/// A convenience result type for document store operations.
pub type Result<T> = std::result::Result<T, DocStoreError>;
