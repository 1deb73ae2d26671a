//! User-facing indexing store façade.
//!
//! User callbacks read and write their on-chain tables through this type.
//! Every operation is serialized through a single fair async mutex, so no
//! two cache-mutating operations interleave even when callback code
//! `await`s mid-operation; a write completed by one callback is visible
//! to the next `find` on the same store.
//!
//! The insert builder exposes three terminal operations:
//!
//! ```ignore
//! store.insert("Pet").values(row).execute().await?;               // optimistic
//! store.insert("Pet").values(row).on_conflict_do_nothing().await?;
//! store.insert("Pet").values(row).on_conflict_do_update(patch).await?;
//! ```
//!
//! The optimistic default defers database-level unique checking to flush
//! time; a conflict that is visible in the cache errors synchronously.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::error::{Result, StoreError};
use crate::ports::db::{DbExecutor, SqlStatement};
use crate::store::row_cache::RowCache;
use crate::types::row::{Row, SchemaRegistry, TableSchema, Value, WriteKind};

use crate::metrics as metric_names;

// ═══════════════════════════════════════════════════════════════════════════════
// PATCH
// ═══════════════════════════════════════════════════════════════════════════════

/// Update payload: static fields, or a function of the current row.
#[derive(Clone)]
pub enum Patch {
    /// Overwrite with these fields.
    Static(Row),
    /// Compute the fields from the current row.
    Derived(Arc<dyn Fn(&Row) -> Row + Send + Sync>),
}

impl Patch {
    /// A derived patch from a closure.
    pub fn derived(f: impl Fn(&Row) -> Row + Send + Sync + 'static) -> Self {
        Self::Derived(Arc::new(f))
    }

    /// Resolve against the current row.
    #[must_use]
    pub fn apply(&self, current: &Row) -> Row {
        match self {
            Self::Static(fields) => fields.clone(),
            Self::Derived(f) => f(current),
        }
    }
}

impl From<Row> for Patch {
    fn from(fields: Row) -> Self {
        Self::Static(fields)
    }
}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(fields) => f.debug_tuple("Static").field(fields).finish(),
            Self::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INDEXING STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// The store handed to user callbacks.
///
/// Cloning is cheap; clones share the same row cache and FIFO.
pub struct IndexingStore<D> {
    cache: Arc<Mutex<RowCache<D>>>,
    schema: Arc<SchemaRegistry>,
    db: Arc<D>,
}

impl<D> Clone for IndexingStore<D> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            schema: Arc::clone(&self.schema),
            db: Arc::clone(&self.db),
        }
    }
}

impl<D> fmt::Debug for IndexingStore<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexingStore").finish_non_exhaustive()
    }
}

impl<D: DbExecutor> IndexingStore<D> {
    /// Create a store over a row cache.
    ///
    /// `database_is_empty` reflects whether indexing starts from an empty
    /// checkpoint (see [`RowCache::new`]).
    #[must_use]
    pub fn new(
        db: Arc<D>,
        schema: Arc<SchemaRegistry>,
        settings: crate::config::StoreSettings,
        database_is_empty: bool,
    ) -> Self {
        let cache = RowCache::new(
            Arc::clone(&db),
            Arc::clone(&schema),
            settings,
            database_is_empty,
        );
        Self {
            cache: Arc::new(Mutex::new(cache)),
            schema,
            db,
        }
    }

    fn resolve_table(&self, name: &str) -> Result<Arc<TableSchema>> {
        let table = self
            .schema
            .table(name)
            .ok_or_else(|| StoreError::UndefinedTable(name.to_string()))?;
        if !table.onchain {
            return Err(StoreError::InvalidStoreMethod(format!(
                "table `{name}` is not part of the on-chain schema"
            ))
            .into());
        }
        Ok(Arc::clone(table))
    }

    fn count_query(table: &str, method: &'static str) {
        counter!(
            metric_names::INDEXING_STORE_QUERIES_TOTAL,
            "table" => table.to_string(),
            "method" => method
        )
        .increment(1);
    }

    // ───────────────────────────────────────────────────────────────────────────
    // OPERATIONS
    // ───────────────────────────────────────────────────────────────────────────

    /// Read a row by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UndefinedTable`] /
    /// [`StoreError::InvalidStoreMethod`] on misuse, plus cache and
    /// database errors.
    pub async fn find(&self, table: &str, key: &Row) -> Result<Option<Row>> {
        let schema = self.resolve_table(table)?;
        Self::count_query(table, "find");
        let mut cache = self.cache.lock().await;
        cache.get(&schema, key).await
    }

    /// Start an insert.
    #[must_use]
    pub fn insert(&self, table: &str) -> InsertBuilder<D> {
        InsertBuilder {
            store: self.clone(),
            table: table.to_string(),
        }
    }

    /// Start an update of the row at `key`.
    #[must_use]
    pub fn update(&self, table: &str, key: Row) -> UpdateBuilder<D> {
        UpdateBuilder {
            store: self.clone(),
            table: table.to_string(),
            key,
        }
    }

    /// Delete a row by primary key. Returns whether a row was deleted.
    ///
    /// # Errors
    ///
    /// Returns misuse errors and database errors.
    pub async fn delete(&self, table: &str, key: &Row) -> Result<bool> {
        let schema = self.resolve_table(table)?;
        Self::count_query(table, "delete");
        let mut cache = self.cache.lock().await;
        cache.delete(&schema, key).await
    }

    /// Run a raw SQL query.
    ///
    /// The cache is flushed and invalidated first, so rows written by
    /// callbacks are visible to the query and rows it mutates cannot go
    /// stale in the cache.
    ///
    /// # Errors
    ///
    /// Returns flush and database errors.
    #[instrument(skip(self, query))]
    pub async fn sql(&self, query: &str) -> Result<Vec<Vec<Value>>> {
        Self::count_query("raw", "sql");
        let mut cache = self.cache.lock().await;
        cache.flush().await?;
        cache.invalidate();

        let started = Instant::now();
        let rows = self.db.query(SqlStatement::raw(query)).await?;
        histogram!(metric_names::INDEXING_STORE_RAW_SQL_DURATION)
            .record(started.elapsed().as_secs_f64());
        debug!(rows = rows.len(), "Raw SQL query finished");
        Ok(rows)
    }

    /// Flush pending writes to the database (event-batch boundary).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Flush`] on failure; fatal to the run.
    pub async fn flush(&self) -> Result<()> {
        let mut cache = self.cache.lock().await;
        cache.flush().await
    }

    /// Whether the row cache exceeds its byte budget.
    pub async fn is_cache_full(&self) -> bool {
        self.cache.lock().await.is_full()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INSERT BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

/// Insert builder; see the module docs for the three terminal operations.
#[derive(Debug)]
pub struct InsertBuilder<D> {
    store: IndexingStore<D>,
    table: String,
}

impl<D: DbExecutor> InsertBuilder<D> {
    /// Provide the row to insert.
    #[must_use]
    pub fn values(self, row: Row) -> InsertOp<D> {
        InsertOp {
            store: self.store,
            table: self.table,
            row,
        }
    }
}

/// A pending insert with its row bound.
#[derive(Debug)]
pub struct InsertOp<D> {
    store: IndexingStore<D>,
    table: String,
    row: Row,
}

impl<D: DbExecutor> InsertOp<D> {
    /// Optimistic insert: writes the cache entry without consulting the
    /// database; database-level conflicts surface at flush time as
    /// [`StoreError::Flush`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueConstraint`] when the key already holds
    /// a live cached row, plus normalization errors.
    pub async fn execute(self) -> Result<Row> {
        let schema = self.store.resolve_table(&self.table)?;
        IndexingStore::<D>::count_query(&self.table, "insert");
        let mut cache = self.store.cache.lock().await;

        if let Some(Some(_)) = cache.peek(&schema, &self.row)? {
            let key = schema.encode_primary_key(&self.row)?;
            return Err(StoreError::UniqueConstraint {
                table: self.table,
                key,
            }
            .into());
        }

        Ok(cache.set(&schema, &self.row, WriteKind::Insert, None)?)
    }

    /// Insert unless the key already exists; returns `None` on conflict.
    ///
    /// Unlike [`Self::execute`], this consults the database for the
    /// existing row.
    ///
    /// # Errors
    ///
    /// Returns normalization and database errors.
    pub async fn on_conflict_do_nothing(self) -> Result<Option<Row>> {
        let schema = self.store.resolve_table(&self.table)?;
        IndexingStore::<D>::count_query(&self.table, "insert");
        let mut cache = self.store.cache.lock().await;

        if cache.get(&schema, &self.row).await?.is_some() {
            return Ok(None);
        }
        Ok(Some(cache.set(&schema, &self.row, WriteKind::Insert, None)?))
    }

    /// Insert, or patch the existing row on conflict.
    ///
    /// # Errors
    ///
    /// Returns normalization and database errors.
    pub async fn on_conflict_do_update(self, patch: impl Into<Patch> + Send) -> Result<Row> {
        let patch = patch.into();
        let schema = self.store.resolve_table(&self.table)?;
        IndexingStore::<D>::count_query(&self.table, "insert");
        let mut cache = self.store.cache.lock().await;

        match cache.get(&schema, &self.row).await? {
            Some(current) => {
                let fields = patch.apply(&current);
                Ok(cache.set(&schema, &fields, WriteKind::Update, Some(&current))?)
            }
            None => Ok(cache.set(&schema, &self.row, WriteKind::Insert, None)?),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// UPDATE BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

/// Update builder bound to a table and key.
#[derive(Debug)]
pub struct UpdateBuilder<D> {
    store: IndexingStore<D>,
    table: String,
    key: Row,
}

impl<D: DbExecutor> UpdateBuilder<D> {
    /// Apply the patch to the current row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RecordNotFound`] when the key does not
    /// exist, plus normalization and database errors.
    pub async fn set(self, patch: impl Into<Patch> + Send) -> Result<Row> {
        let patch = patch.into();
        let schema = self.store.resolve_table(&self.table)?;
        IndexingStore::<D>::count_query(&self.table, "update");
        let mut cache = self.store.cache.lock().await;

        let Some(current) = cache.get(&schema, &self.key).await? else {
            let key = schema.encode_primary_key(&self.key).unwrap_or_default();
            return Err(StoreError::RecordNotFound {
                table: self.table,
                key,
            }
            .into());
        };

        let fields = patch.apply(&current);
        Ok(cache.set(&schema, &fields, WriteKind::Update, Some(&current))?)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
