//! pgvector (PostgreSQL) vector store backend.
//!
//! Provides [`PgVectorStore`] which implements [`VectorStore`] using
//! [sqlx](https://docs.rs/sqlx) with the
//! [pgvector](https://github.com/pgvector/pgvector) PostgreSQL extension.
//!
//! Each collection is a table named `{table_prefix}{collection}` with columns
//! `id` (primary key), `embedding` (`vector(dim)`), `document` and `metadata`
//! (`jsonb`), plus one HNSW index named `hnsw_index_{table}_embedding`.
//!
//! Index builds and drops use `CONCURRENTLY`, so they do not block reads or
//! writes on the table. Batch upserts run in a single transaction.
//!
//! # Prerequisites
//!
//! - PostgreSQL with the `pgvector` extension available (it is created on
//!   connect if missing)
//!
//! # Example
//!
//! ```rust,ignore
//! use adk_docstore::PgConnectionConfig;
//! use adk_docstore::pgvector::PgVectorStore;
//!
//! let store = PgVectorStore::connect(&PgConnectionConfig::docker_from_env()?).await?;
//! store.create_collection("docs", 384).await?;
//! ```

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

use crate::config::PgConnectionConfig;
use crate::document::StoredRecord;
use crate::error::{DocStoreError, Result};
use crate::filter::MetadataFilter;
use crate::index::{
    DistanceMetric, EnsureOutcome, IndexInfo, IndexParams, IndexState, index_name,
};
use crate::registry::validate_collection_name;
use crate::vectorstore::{BackendCapabilities, VectorStore};

const BACKEND: &str = "pgvector";

/// Advisory lock key serializing `CREATE EXTENSION` across processes.
const EXTENSION_LOCK_ID: i64 = 1_573_678_846_307_946_496;

/// Catalog view of a collection's HNSW index.
enum IndexLookup {
    Missing,
    /// Invalid and not being built: a concurrent build failed or was cancelled.
    Abandoned,
    Found(IndexInfo),
}

/// A [`VectorStore`] backed by PostgreSQL with the pgvector extension.
pub struct PgVectorStore {
    pool: PgPool,
    table_prefix: String,
    iterative_scan: bool,
}

impl PgVectorStore {
    /// Connect with the given settings and make sure the `vector` extension exists.
    ///
    /// The pool holds at most `pool_size` connections; when all are busy an
    /// operation waits up to `connect_timeout_secs` for one.
    pub async fn connect(config: &PgConnectionConfig) -> Result<Self> {
        config.validate()?;
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(config.connect_timeout())
            .connect_with(connect_options(config)?)
            .await
            .map_err(Self::map_err)?;

        let store = Self::from_pool(pool).with_table_prefix(config.table_prefix.clone());
        store.create_vector_extension().await?;
        debug!(pool_size = config.pool_size, prefix = %store.table_prefix, "connected to pgvector");
        Ok(store)
    }

    /// Create a new pgvector store from an existing connection pool.
    ///
    /// Does not create the `vector` extension.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            table_prefix: PgConnectionConfig::default().table_prefix,
            iterative_scan: false,
        }
    }

    /// Set the table name prefix.
    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Enable pgvector's iterative index scans for filtered searches.
    ///
    /// Without it an HNSW scan can run out of candidates when the filter is
    /// selective and return fewer than `k` rows. Requires pgvector 0.8 or later.
    pub fn with_iterative_scan(mut self, enabled: bool) -> Self {
        self.iterative_scan = enabled;
        self
    }

    async fn create_vector_extension(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Self::map_err)?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(EXTENSION_LOCK_ID)
            .execute(&mut *tx)
            .await
            .map_err(Self::map_err)?;
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&mut *tx)
            .await
            .map_err(Self::map_err)?;
        tx.commit().await.map_err(Self::map_err)
    }

    fn map_err(e: sqlx::Error) -> DocStoreError {
        // 42P01: undefined_table
        if let Some(db) = e.as_database_error() {
            if db.code().as_deref() == Some("42P01") {
                return DocStoreError::NotFoundError(db.message().to_string());
            }
        }
        DocStoreError::backend(BACKEND, e.to_string())
    }

    fn table_name(&self, collection: &str) -> Result<String> {
        validate_collection_name(collection)?;
        Ok(format!("{}{collection}", self.table_prefix))
    }

    async fn require_table(&self, collection: &str) -> Result<String> {
        let table = self.table_name(collection)?;
        match self.table_dimension(&table).await? {
            Some(_) => Ok(table),
            None => Err(DocStoreError::missing_collection(collection)),
        }
    }

    async fn table_dimension(&self, table: &str) -> Result<Option<usize>> {
        // For `vector(n)` columns, atttypmod holds n.
        let typmod: Option<i32> = sqlx::query_scalar(
            "SELECT a.atttypmod FROM pg_attribute a \
             JOIN pg_class c ON c.oid = a.attrelid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = current_schema() AND c.relname = $1 \
               AND a.attname = 'embedding' AND NOT a.attisdropped",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::map_err)?;
        Ok(typmod.and_then(|t| usize::try_from(t).ok()))
    }

    async fn lookup_index(&self, name: &str) -> Result<IndexLookup> {
        let row = sqlx::query(
            "SELECT i.indisvalid, pg_get_indexdef(i.indexrelid) AS definition, \
                    EXISTS (SELECT 1 FROM pg_stat_progress_create_index p \
                            WHERE p.index_relid = i.indexrelid) AS in_progress \
             FROM pg_class c \
             JOIN pg_index i ON i.indexrelid = c.oid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = current_schema() AND c.relname = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::map_err)?;

        let Some(row) = row else {
            return Ok(IndexLookup::Missing);
        };
        let valid: bool = row.try_get("indisvalid").map_err(Self::map_err)?;
        let in_progress: bool = row.try_get("in_progress").map_err(Self::map_err)?;
        let Some(state) = index_state(valid, in_progress) else {
            return Ok(IndexLookup::Abandoned);
        };
        let definition: String = row.try_get("definition").map_err(Self::map_err)?;
        Ok(IndexLookup::Found(IndexInfo {
            name: name.to_string(),
            state,
            params: parse_index_params(&definition),
            built_at: None,
        }))
    }

    async fn drop_index_named(&self, index: &str) -> Result<()> {
        sqlx::raw_sql(&format!("DROP INDEX CONCURRENTLY IF EXISTS \"{index}\""))
            .execute(&self.pool)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    fn record_from_row(row: &PgRow) -> Result<StoredRecord> {
        Ok(StoredRecord {
            id: row.try_get("id").map_err(Self::map_err)?,
            embedding: Vec::new(),
            content: row.try_get("document").map_err(Self::map_err)?,
            metadata: row.try_get("metadata").map_err(Self::map_err)?,
        })
    }
}

/// Pool connect options. A connection string is parsed as-is; otherwise the
/// discrete fields are set directly, so credentials need no URL escaping.
fn connect_options(config: &PgConnectionConfig) -> Result<PgConnectOptions> {
    if let Some(url) = &config.connection_string {
        return PgConnectOptions::from_str(url)
            .map_err(|e| DocStoreError::ConfigError(format!("invalid connection string: {e}")));
    }
    Ok(PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.database))
}

/// `None` for an invalid index that no backend is building.
fn index_state(valid: bool, in_progress: bool) -> Option<IndexState> {
    match (valid, in_progress) {
        (true, _) => Some(IndexState::Ready),
        (false, true) => Some(IndexState::Building),
        (false, false) => None,
    }
}

/// pgvector expects vectors as text like `[1,2,3]`.
fn vector_literal(embedding: &[f32]) -> String {
    format!("[{}]", embedding.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(","))
}

fn operator_class(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "vector_cosine_ops",
        DistanceMetric::InnerProduct => "vector_ip_ops",
        DistanceMetric::L2 => "vector_l2_ops",
    }
}

fn distance_operator(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "<=>",
        DistanceMetric::InnerProduct => "<#>",
        DistanceMetric::L2 => "<->",
    }
}

fn score_expression(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "1 - (embedding <=> $1::vector)",
        DistanceMetric::InnerProduct => "(embedding <#> $1::vector) * -1",
        DistanceMetric::L2 => "1 / (1 + (embedding <-> $1::vector))",
    }
}

/// Recover build parameters from `pg_get_indexdef` output such as
/// `... USING hnsw (embedding vector_cosine_ops) WITH (m='16', ef_construction='200')`.
fn parse_index_params(definition: &str) -> Option<IndexParams> {
    let metric = [DistanceMetric::Cosine, DistanceMetric::InnerProduct, DistanceMetric::L2]
        .into_iter()
        .find(|m| definition.contains(operator_class(*m)))?;

    let option = |key: &str| -> Option<usize> {
        let start = definition.find(&format!("{key}='"))? + key.len() + 2;
        let rest = &definition[start..];
        rest[..rest.find('\'')?].parse().ok()
    };
    let defaults = IndexParams::default();
    Some(IndexParams {
        metric,
        m: option("m").unwrap_or(defaults.m),
        ef_construction: option("ef_construction").unwrap_or(defaults.ef_construction),
    })
}

#[async_trait]
impl VectorStore for PgVectorStore {
    fn name(&self) -> &str {
        BACKEND
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            atomic_batch_upsert: true,
            concurrent_index_build: true,
            maintains_index_on_write: true,
        }
    }

    async fn collection_dimension(&self, name: &str) -> Result<Option<usize>> {
        let table = self.table_name(name)?;
        self.table_dimension(&table).await
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let table = self.table_name(name)?;

        let create_sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (\
                id TEXT PRIMARY KEY, \
                embedding vector({dimensions}) NOT NULL, \
                document TEXT NOT NULL, \
                metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb\
            )"
        );
        sqlx::query(&create_sql).execute(&self.pool).await.map_err(Self::map_err)?;

        debug!(collection = name, %table, dimensions, "created pgvector table");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let table = self.table_name(name)?;
        let index = index_name(&table);

        // CONCURRENTLY cannot run inside a transaction or a pipelined
        // statement, so both go through the simple query protocol.
        sqlx::raw_sql(&format!("DROP INDEX CONCURRENTLY IF EXISTS \"{index}\""))
            .execute(&self.pool)
            .await
            .map_err(Self::map_err)?;
        sqlx::raw_sql(&format!("DROP TABLE IF EXISTS \"{table}\""))
            .execute(&self.pool)
            .await
            .map_err(Self::map_err)?;

        debug!(collection = name, %table, "deleted pgvector table");
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT c.relname::text FROM pg_class c \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             JOIN pg_attribute a ON a.attrelid = c.oid \
             WHERE n.nspname = current_schema() AND c.relkind = 'r' \
               AND left(c.relname, length($1)) = $1 \
               AND a.attname = 'embedding' AND NOT a.attisdropped \
             ORDER BY c.relname",
        )
        .bind(&self.table_prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_err)?;

        Ok(tables
            .into_iter()
            .filter_map(|t| t.strip_prefix(self.table_prefix.as_str()).map(str::to_string))
            .filter(|name| validate_collection_name(name).is_ok())
            .collect())
    }

    async fn has_records(&self, collection: &str) -> Result<bool> {
        let table = self.table_name(collection)?;
        let sql = format!("SELECT EXISTS (SELECT 1 FROM \"{table}\" LIMIT 1)");
        sqlx::query_scalar(&sql).fetch_one(&self.pool).await.map_err(Self::map_err)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let table = self.table_name(collection)?;
        let sql = format!("SELECT count(*) FROM \"{table}\"");
        let count: i64 =
            sqlx::query_scalar(&sql).fetch_one(&self.pool).await.map_err(Self::map_err)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn upsert(&self, collection: &str, records: &[StoredRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let table = self.table_name(collection)?;
        let upsert_sql = format!(
            "INSERT INTO \"{table}\" (id, embedding, document, metadata) \
             VALUES ($1, $2::vector, $3, $4::jsonb) \
             ON CONFLICT (id) DO UPDATE SET \
                embedding = EXCLUDED.embedding, \
                document = EXCLUDED.document, \
                metadata = EXCLUDED.metadata"
        );

        let mut tx = self.pool.begin().await.map_err(Self::map_err)?;
        for record in records {
            sqlx::query(&upsert_sql)
                .bind(&record.id)
                .bind(vector_literal(&record.embedding))
                .bind(&record.content)
                .bind(record.metadata.to_string())
                .execute(&mut *tx)
                .await
                .map_err(Self::map_err)?;
        }
        tx.commit().await.map_err(Self::map_err)?;

        debug!(collection, count = records.len(), "upserted records to pgvector");
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let table = self.table_name(collection)?;

        let delete_sql = format!("DELETE FROM \"{table}\" WHERE id = ANY($1)");
        let id_vec: Vec<String> = ids.iter().map(|s| s.to_string()).collect();

        sqlx::query(&delete_sql).bind(&id_vec).execute(&self.pool).await.map_err(Self::map_err)?;

        debug!(collection, count = ids.len(), "deleted records from pgvector");
        Ok(())
    }

    async fn get_all(
        &self,
        collection: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<StoredRecord>> {
        let table = self.table_name(collection)?;
        let rows = match filter {
            Some(filter) => {
                let sql = format!(
                    "SELECT id, document, metadata FROM \"{table}\" WHERE metadata @> $1::jsonb"
                );
                sqlx::query(&sql).bind(filter.as_json().to_string()).fetch_all(&self.pool).await
            }
            None => {
                let sql = format!("SELECT id, document, metadata FROM \"{table}\"");
                sqlx::query(&sql).fetch_all(&self.pool).await
            }
        }
        .map_err(Self::map_err)?;

        rows.iter().map(Self::record_from_row).collect()
    }

    async fn get_by_ids(&self, collection: &str, ids: &[String]) -> Result<Vec<StoredRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let table = self.table_name(collection)?;

        // Each input position is tagged with its ordinal, so the output follows
        // the caller's order and repeats duplicates.
        let sql = format!(
            "SELECT t.id, t.document, t.metadata \
             FROM unnest($1::text[]) WITH ORDINALITY AS input(id, ord) \
             JOIN \"{table}\" t ON t.id = input.id \
             ORDER BY input.ord"
        );
        let rows = sqlx::query(&sql).bind(ids).fetch_all(&self.pool).await.map_err(Self::map_err)?;
        rows.iter().map(Self::record_from_row).collect()
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
        metric: DistanceMetric,
    ) -> Result<Vec<(StoredRecord, f32)>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let table = self.table_name(collection)?;

        let predicate = if filter.is_some() { "WHERE metadata @> $3::jsonb" } else { "" };
        let search_sql = format!(
            "SELECT id, document, metadata, {score} AS score \
             FROM \"{table}\" {predicate} \
             ORDER BY embedding {op} $1::vector \
             LIMIT $2",
            score = score_expression(metric),
            op = distance_operator(metric),
        );

        let mut query = sqlx::query(&search_sql)
            .bind(vector_literal(embedding))
            .bind(i64::try_from(top_k).unwrap_or(i64::MAX));
        if let Some(filter) = filter {
            query = query.bind(filter.as_json().to_string());
        }

        let mut tx = self.pool.begin().await.map_err(Self::map_err)?;
        if self.iterative_scan && filter.is_some() {
            sqlx::query("SET LOCAL hnsw.iterative_scan = strict_order")
                .execute(&mut *tx)
                .await
                .map_err(Self::map_err)?;
        }
        let rows = query.fetch_all(&mut *tx).await.map_err(Self::map_err)?;
        tx.commit().await.map_err(Self::map_err)?;

        rows.iter()
            .map(|row| {
                let score: f64 = row.try_get("score").map_err(Self::map_err)?;
                Ok((Self::record_from_row(row)?, score as f32))
            })
            .collect()
    }

    async fn ensure_index(&self, collection: &str, params: &IndexParams) -> Result<EnsureOutcome> {
        let table = self.require_table(collection).await?;
        let index = index_name(&table);

        match self.lookup_index(&index).await? {
            IndexLookup::Found(info) => return Ok(EnsureOutcome::AlreadyPresent(info)),
            IndexLookup::Abandoned => {
                warn!(collection, %index, "dropping invalid hnsw index left by a failed build");
                self.drop_index_named(&index).await?;
            }
            IndexLookup::Missing => {}
        }

        let create_sql = format!(
            "CREATE INDEX CONCURRENTLY IF NOT EXISTS \"{index}\" ON \"{table}\" \
             USING hnsw (embedding {opclass}) \
             WITH (m = {m}, ef_construction = {ef})",
            opclass = operator_class(params.metric),
            m = params.m,
            ef = params.ef_construction,
        );
        sqlx::raw_sql(&create_sql).execute(&self.pool).await.map_err(Self::map_err)?;
        debug!(
            collection,
            %index,
            m = params.m,
            ef_construction = params.ef_construction,
            "built hnsw index"
        );

        let info = match self.lookup_index(&index).await? {
            IndexLookup::Found(info) => info,
            IndexLookup::Missing | IndexLookup::Abandoned => IndexInfo {
                name: index.clone(),
                state: IndexState::Building,
                params: Some(*params),
                built_at: None,
            },
        };
        Ok(EnsureOutcome::Created(info))
    }

    async fn drop_index(&self, collection: &str) -> Result<()> {
        let table = self.table_name(collection)?;
        let index = index_name(&table);
        self.drop_index_named(&index).await?;
        debug!(collection, %index, "dropped hnsw index");
        Ok(())
    }

    async fn index_info(&self, collection: &str) -> Result<IndexInfo> {
        let table = self.require_table(collection).await?;
        let index = index_name(&table);
        match self.lookup_index(&index).await? {
            IndexLookup::Found(info) => Ok(info),
            IndexLookup::Missing | IndexLookup::Abandoned => Ok(IndexInfo::absent(index)),
        }
    }
}
