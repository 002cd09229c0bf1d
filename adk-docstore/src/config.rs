//! Configuration for the document store and its PostgreSQL backend.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DocStoreError, Result};
use crate::index::{DistanceMetric, IndexParams};
use crate::registry::validate_collection_name;

/// Configuration parameters for a [`DocumentStore`](crate::DocumentStore).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocStoreConfig {
    /// The collection a new store handle targets.
    pub collection_name: String,
    /// Drop and recreate `collection_name` when the store is opened.
    pub replace_collection: bool,
    /// Parameters for every index this store builds.
    pub index: IndexParams,
    /// Maximum number of texts sent to the embedding provider per call.
    pub embedding_batch_size: usize,
}

impl Default for DocStoreConfig {
    fn default() -> Self {
        Self {
            collection_name: "embeddings".to_string(),
            replace_collection: false,
            index: IndexParams::default(),
            embedding_batch_size: 256,
        }
    }
}

impl DocStoreConfig {
    /// Create a new builder for constructing a [`DocStoreConfig`].
    pub fn builder() -> DocStoreConfigBuilder {
        DocStoreConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`DocStoreError::ConfigError`] if:
    /// - `collection_name` is not a valid collection name
    /// - `index.m < 2`
    /// - `index.ef_construction < index.m`
    /// - `embedding_batch_size == 0`
    pub fn validate(&self) -> Result<()> {
        validate_collection_name(&self.collection_name)
            .map_err(|e| DocStoreError::ConfigError(format!("collection_name: {e}")))?;
        if self.index.m < 2 {
            return Err(DocStoreError::ConfigError(format!(
                "index m ({}) must be at least 2",
                self.index.m
            )));
        }
        if self.index.ef_construction < self.index.m {
            return Err(DocStoreError::ConfigError(format!(
                "index ef_construction ({}) must be at least m ({})",
                self.index.ef_construction, self.index.m
            )));
        }
        if self.embedding_batch_size == 0 {
            return Err(DocStoreError::ConfigError(
                "embedding_batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`DocStoreConfig`].
#[derive(Debug, Clone, Default)]
pub struct DocStoreConfigBuilder {
    config: DocStoreConfig,
}

impl DocStoreConfigBuilder {
    /// Set the default collection.
    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.config.collection_name = name.into();
        self
    }

    /// Drop and recreate the default collection when the store is opened.
    pub fn replace_collection(mut self, replace: bool) -> Self {
        self.config.replace_collection = replace;
        self
    }

    /// Set the distance metric for search and index builds.
    pub fn metric(mut self, metric: DistanceMetric) -> Self {
        self.config.index.metric = metric;
        self
    }

    /// Set the HNSW connectivity parameter.
    pub fn hnsw_m(mut self, m: usize) -> Self {
        self.config.index.m = m;
        self
    }

    /// Set the HNSW build-quality parameter.
    pub fn hnsw_ef_construction(mut self, ef_construction: usize) -> Self {
        self.config.index.ef_construction = ef_construction;
        self
    }

    /// Set the number of texts embedded per provider call.
    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    /// Build the [`DocStoreConfig`], validating it.
    ///
    /// # Errors
    ///
    /// See [`DocStoreConfig::validate`].
    pub fn build(self) -> Result<DocStoreConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Connection settings for the pgvector backend.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct PgConnectionConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database user.
    pub user: String,
    /// Database password.
    pub password: String,
    /// Database name.
    pub database: String,
    /// Full connection string; takes precedence over the individual fields.
    pub connection_string: Option<String>,
    /// Maximum number of pooled connections.
    pub pool_size: u32,
    /// How long an operation waits for a pooled connection, in seconds.
    pub connect_timeout_secs: u64,
    /// Prefix prepended to collection names to form table names.
    pub table_prefix: String,
}

impl std::fmt::Debug for PgConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("connection_string", &self.connection_string.as_ref().map(|_| "<redacted>"))
            .field("pool_size", &self.pool_size)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("table_prefix", &self.table_prefix)
            .finish()
    }
}

impl Default for PgConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "docstore".to_string(),
            connection_string: None,
            pool_size: 10,
            connect_timeout_secs: 30,
            table_prefix: "docstore_".to_string(),
        }
    }
}

impl PgConnectionConfig {
    /// Settings for a local (e.g. docker) database from `POSTGRES_USER`,
    /// `POSTGRES_PASSWORD` and `POSTGRES_DB`, falling back to the defaults.
    pub fn docker_from_env() -> Result<Self> {
        Self::docker_from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`docker_from_env`](Self::docker_from_env) with a custom variable source.
    pub fn docker_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            user: lookup("POSTGRES_USER").unwrap_or(defaults.user.clone()),
            password: lookup("POSTGRES_PASSWORD").unwrap_or(defaults.password.clone()),
            database: lookup("POSTGRES_DB").unwrap_or(defaults.database.clone()),
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }

    /// Settings for a hosted database from `POSTGRES_CONNECTION_STRING`.
    pub fn cloud_from_env() -> Result<Self> {
        Self::cloud_from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`cloud_from_env`](Self::cloud_from_env) with a custom variable source.
    pub fn cloud_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let connection_string =
            lookup("POSTGRES_CONNECTION_STRING").filter(|s| !s.is_empty()).ok_or_else(|| {
                DocStoreError::ConfigError(
                    "POSTGRES_CONNECTION_STRING must be set for a cloud database".to_string(),
                )
            })?;
        let config = Self { connection_string: Some(connection_string), ..Self::default() };
        config.validate()?;
        Ok(config)
    }

    /// Set the maximum number of pooled connections.
    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the table name prefix.
    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// How long to wait for a pooled connection.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Check that every required connection parameter is present.
    ///
    /// # Errors
    ///
    /// Returns [`DocStoreError::ConfigError`] naming the first missing or invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.connection_string.is_none() {
            let required = [
                ("host", self.host.as_str()),
                ("user", self.user.as_str()),
                ("password", self.password.as_str()),
                ("database", self.database.as_str()),
            ];
            for (field, value) in required {
                if value.is_empty() {
                    return Err(DocStoreError::ConfigError(format!("{field} must not be empty")));
                }
            }
            if self.port == 0 {
                return Err(DocStoreError::ConfigError("port must not be zero".to_string()));
            }
        }
        if self.pool_size == 0 {
            return Err(DocStoreError::ConfigError(
                "pool_size must be greater than zero".to_string(),
            ));
        }
        let prefix_ok = !self.table_prefix.is_empty()
            && self.table_prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !self.table_prefix.starts_with(|c: char| c.is_ascii_digit());
        if !prefix_ok {
            return Err(DocStoreError::ConfigError(format!(
                "table_prefix '{}' must be a non-empty identifier",
                self.table_prefix
            )));
        }
        Ok(())
    }
}
