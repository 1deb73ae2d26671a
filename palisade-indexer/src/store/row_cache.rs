//! Write-behind row cache for user on-chain tables.
//!
//! Every user write lands here first, keyed by `(table, primary key)`.
//! Reads are served from the cache when possible, falling through to a
//! single-row database read otherwise. A flush drains `Insert` entries
//! into plain `INSERT` batches and `Update` entries into
//! `INSERT .. ON CONFLICT DO UPDATE` batches, demotes everything to
//! `Find`, and evicts the least recently used entries when over the byte
//! budget.
//!
//! # Entry life cycle
//!
//! ```text
//!   set(Insert) ──▶ Insert ──┐
//!   set(Update) ──▶ Update ──┼── flush ──▶ Find ── evict? ──▶ gone
//!   get (DB read) ─▶ Find  ──┘
//! ```
//!
//! Size accounting invariant: the sum of entry byte estimates always
//! equals `cache_bytes`.
//!
//! While `is_database_empty` holds (fresh start, nothing evicted, no raw
//! SQL yet), every database row has a cache entry, so cache misses skip
//! the database entirely.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::StoreSettings;
use crate::error::{AppError, Result, StoreError};
use crate::ports::db::{DbExecutor, SqlStatement};
use crate::types::row::{
    Row, SchemaRegistry, TableId, TableSchema, Value, WriteKind, estimated_row_bytes,
    normalize_row,
};

// ═══════════════════════════════════════════════════════════════════════════════
// CACHE ENTRIES
// ═══════════════════════════════════════════════════════════════════════════════

/// How an entry relates to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Written by a user insert; not yet in the database.
    Insert,
    /// Patched by a user update; the database holds a stale version.
    Update,
    /// Mirrors the database (including "known absent" when the row is
    /// `None`).
    Find,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    kind: EntryKind,
    row: Option<Row>,
    bytes: u64,
    op_index: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROW CACHE
// ═══════════════════════════════════════════════════════════════════════════════

/// Table-partitioned write-behind row cache.
///
/// Owned exclusively by the indexing store façade; all calls arrive
/// serialized through its FIFO, so the cache itself needs no locking.
#[derive(Debug)]
pub struct RowCache<D> {
    db: Arc<D>,
    schema: Arc<SchemaRegistry>,
    settings: StoreSettings,
    tables: HashMap<TableId, HashMap<String, CacheEntry>>,
    cache_bytes: u64,
    op_counter: u64,
    is_database_empty: bool,
}

impl<D: DbExecutor> RowCache<D> {
    /// Create a cache.
    ///
    /// `database_is_empty` is true when indexing starts from an empty
    /// checkpoint; it lets cache misses skip the database until the first
    /// eviction or raw-SQL invalidation.
    #[must_use]
    pub fn new(
        db: Arc<D>,
        schema: Arc<SchemaRegistry>,
        settings: StoreSettings,
        database_is_empty: bool,
    ) -> Self {
        Self {
            db,
            schema,
            settings,
            tables: HashMap::new(),
            cache_bytes: 0,
            op_counter: 0,
            is_database_empty: database_is_empty,
        }
    }

    /// Current tracked size in bytes.
    #[must_use]
    pub const fn cache_bytes(&self) -> u64 {
        self.cache_bytes
    }

    /// Number of live entries across all tables.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.tables.values().map(HashMap::len).sum()
    }

    /// Whether the cache exceeds its byte budget.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.cache_bytes > self.settings.max_cache_bytes
    }

    /// The schema registry this cache validates against.
    #[must_use]
    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        &self.schema
    }

    fn next_op(&mut self) -> u64 {
        let op = self.op_counter;
        self.op_counter += 1;
        op
    }

    /// Peek the cached row for a key without an LRU touch or database
    /// fallthrough. `None` = no entry; `Some(None)` = known absent;
    /// `Some(Some(_))` = cached row.
    ///
    /// # Errors
    ///
    /// Returns an error if the key row fails primary-key encoding.
    pub fn peek(
        &self,
        table: &TableSchema,
        key_row: &Row,
    ) -> std::result::Result<Option<Option<&Row>>, StoreError> {
        let key = table.encode_primary_key(key_row)?;
        Ok(self
            .tables
            .get(&table.id)
            .and_then(|entries| entries.get(&key))
            .map(|entry| entry.row.as_ref()))
    }

    /// Kind of the cached entry for a key, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the key row fails primary-key encoding.
    pub fn entry_kind(
        &self,
        table: &TableSchema,
        key_row: &Row,
    ) -> std::result::Result<Option<EntryKind>, StoreError> {
        let key = table.encode_primary_key(key_row)?;
        Ok(self
            .tables
            .get(&table.id)
            .and_then(|entries| entries.get(&key))
            .map(|entry| entry.kind))
    }

    // ───────────────────────────────────────────────────────────────────────────
    // GET
    // ───────────────────────────────────────────────────────────────────────────

    /// Read a row by primary key: cache first, then the database.
    ///
    /// Database reads populate a `Find` entry, including a negative entry
    /// when the row is absent.
    ///
    /// # Errors
    ///
    /// Returns key-encoding errors and database errors.
    pub async fn get(&mut self, table: &Arc<TableSchema>, key_row: &Row) -> Result<Option<Row>> {
        let key = table.encode_primary_key(key_row)?;

        if let Some(entry) = self
            .tables
            .get_mut(&table.id)
            .and_then(|entries| entries.get_mut(&key))
        {
            entry.op_index = self.op_counter;
            self.op_counter += 1;
            trace!(table = %table.id, key, "Row cache hit");
            return Ok(entry.row.clone());
        }

        if self.is_database_empty {
            trace!(table = %table.id, key, "Row cache miss, database known empty");
            return Ok(None);
        }

        let stmt = select_by_pk(table, key_row)?;
        let mut rows = self.db.query(stmt).await?;
        let row = match rows.pop() {
            Some(values) => Some(decode_row(table, values)?),
            None => None,
        };

        let bytes = row.as_ref().map_or(13, estimated_row_bytes);
        let op_index = self.next_op();
        self.cache_bytes += bytes;
        self.tables.entry(table.id.clone()).or_default().insert(
            key,
            CacheEntry {
                kind: EntryKind::Find,
                row: row.clone(),
                bytes,
                op_index,
            },
        );
        Ok(row)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // SET
    // ───────────────────────────────────────────────────────────────────────────

    /// Normalize and cache a user write. `base` is the current row for
    /// updates. Returns the normalized row.
    ///
    /// An entry already marked `Insert` keeps that kind through updates:
    /// the row has never reached the database, so it must land in the
    /// insert batch at flush.
    ///
    /// # Errors
    ///
    /// Returns normalization errors ([`StoreError::NotNull`],
    /// [`StoreError::BigIntSerialization`], ...).
    pub fn set(
        &mut self,
        table: &Arc<TableSchema>,
        supplied: &Row,
        kind: WriteKind,
        base: Option<&Row>,
    ) -> Result<Row> {
        let normalized = normalize_row(table, supplied, base, kind)?;
        let key = table.encode_primary_key(&normalized)?;
        let bytes = estimated_row_bytes(&normalized);
        let op_index = self.next_op();

        let entries = self.tables.entry(table.id.clone()).or_default();
        let (old_bytes, entry_kind) = match entries.get(&key) {
            Some(existing) => {
                let kept = if existing.kind == EntryKind::Insert {
                    EntryKind::Insert
                } else {
                    write_entry_kind(kind)
                };
                (existing.bytes, kept)
            }
            None => (0, write_entry_kind(kind)),
        };

        entries.insert(
            key,
            CacheEntry {
                kind: entry_kind,
                row: Some(normalized.clone()),
                bytes,
                op_index,
            },
        );
        self.cache_bytes = self.cache_bytes + bytes - old_bytes;
        Ok(normalized)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // DELETE
    // ───────────────────────────────────────────────────────────────────────────

    /// Delete a row by primary key. Returns whether a row was deleted.
    ///
    /// An unflushed `Insert` entry never reached the database, so its
    /// removal is purely in-memory.
    ///
    /// # Errors
    ///
    /// Returns key-encoding errors and database errors.
    pub async fn delete(&mut self, table: &Arc<TableSchema>, key_row: &Row) -> Result<bool> {
        let key = table.encode_primary_key(key_row)?;

        let removed = self
            .tables
            .get_mut(&table.id)
            .and_then(|entries| entries.remove(&key));
        if let Some(entry) = removed {
            self.cache_bytes -= entry.bytes;
            if entry.kind == EntryKind::Insert {
                return Ok(true);
            }
        } else if self.is_database_empty {
            return Ok(false);
        }

        let affected = self.db.execute(delete_by_pk(table, key_row)?).await?;
        Ok(affected > 0)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // FLUSH
    // ───────────────────────────────────────────────────────────────────────────

    /// Drain pending writes to the database in batched statements, demote
    /// entries to `Find`, and evict the least recently used entries when
    /// over budget.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Flush`] if the batch fails; this is fatal to
    /// the indexing run.
    pub async fn flush(&mut self) -> Result<()> {
        let cache_size = self.entry_count() as u64;
        if cache_size == 0 {
            return Ok(());
        }

        let should_evict = self.cache_bytes > self.settings.max_cache_bytes;
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let flush_index = self
            .op_counter
            .saturating_sub((cache_size as f64 * (1.0 - self.settings.flush_ratio)) as u64);

        let mut statements = Vec::new();
        let mut table_ids: Vec<&TableId> = self.tables.keys().collect();
        table_ids.sort();
        for table_id in table_ids {
            let table = self
                .schema
                .table(table_id.as_str())
                .ok_or_else(|| StoreError::UndefinedTable(table_id.to_string()))?;
            let entries = &self.tables[table_id];

            let inserts: Vec<&Row> = entries
                .values()
                .filter(|e| e.kind == EntryKind::Insert)
                .filter_map(|e| e.row.as_ref())
                .collect();
            let updates: Vec<&Row> = entries
                .values()
                .filter(|e| e.kind == EntryKind::Update)
                .filter_map(|e| e.row.as_ref())
                .collect();

            let batch_rows = (self.settings.max_query_parameters / table.columns.len()).max(1);
            for chunk in inserts.chunks(batch_rows) {
                statements.push(build_upsert(table, chunk, false)?);
            }
            for chunk in updates.chunks(batch_rows) {
                statements.push(build_upsert(table, chunk, true)?);
            }
        }

        if !statements.is_empty() {
            debug!(
                statements = statements.len(),
                entries = cache_size,
                evicting = should_evict,
                "Flushing row cache"
            );
            self.db
                .execute_batch(statements)
                .await
                .map_err(|error| AppError::Store(StoreError::Flush(error.to_string())))?;
        }

        let mut freed = 0u64;
        for entries in self.tables.values_mut() {
            entries.retain(|_, entry| {
                entry.kind = EntryKind::Find;
                if should_evict && entry.op_index < flush_index {
                    freed += entry.bytes;
                    false
                } else {
                    true
                }
            });
        }
        self.cache_bytes -= freed;

        if should_evict {
            // Evicted rows now live only in the database.
            self.is_database_empty = false;
        }
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    // INVALIDATE
    // ───────────────────────────────────────────────────────────────────────────

    /// Clear the cache wholesale. Called around user raw-SQL queries,
    /// which can mutate the database arbitrarily.
    pub fn invalidate(&mut self) {
        self.tables.clear();
        self.cache_bytes = 0;
        self.is_database_empty = false;
        debug!("Row cache invalidated");
    }
}

const fn write_entry_kind(kind: WriteKind) -> EntryKind {
    match kind {
        WriteKind::Insert => EntryKind::Insert,
        WriteKind::Update => EntryKind::Update,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATEMENT BUILDING
// ═══════════════════════════════════════════════════════════════════════════════

fn coerced_pk_params(table: &TableSchema, key_row: &Row) -> Result<Vec<Value>> {
    let mut params = Vec::new();
    for column in table.primary_key_columns() {
        let value = key_row
            .get(&column.name)
            .cloned()
            .ok_or_else(|| StoreError::CheckConstraint {
                column: column.name.clone(),
                message: "primary key column missing".into(),
            })?;
        let coerced = column.kind.coerce(&column.name, value)?;
        params.push(column.kind.encode(&column.name, &coerced)?);
    }
    Ok(params)
}

fn select_by_pk(table: &TableSchema, key_row: &Row) -> Result<SqlStatement> {
    let columns = table
        .columns
        .iter()
        .map(|c| format!("\"{}\"", c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let predicate = table
        .primary_key_columns()
        .iter()
        .enumerate()
        .map(|(i, c)| format!("\"{}\" = ${}", c.name, i + 1))
        .collect::<Vec<_>>()
        .join(" AND ");
    Ok(SqlStatement::new(
        format!("SELECT {columns} FROM \"{}\" WHERE {predicate}", table.id),
        coerced_pk_params(table, key_row)?,
    ))
}

fn delete_by_pk(table: &TableSchema, key_row: &Row) -> Result<SqlStatement> {
    let predicate = table
        .primary_key_columns()
        .iter()
        .enumerate()
        .map(|(i, c)| format!("\"{}\" = ${}", c.name, i + 1))
        .collect::<Vec<_>>()
        .join(" AND ");
    Ok(SqlStatement::new(
        format!("DELETE FROM \"{}\" WHERE {predicate}", table.id),
        coerced_pk_params(table, key_row)?,
    ))
}

/// Build a batched insert; with `on_conflict_update`, conflicting rows are
/// overwritten column by column (`EXCLUDED`).
fn build_upsert(table: &TableSchema, rows: &[&Row], on_conflict_update: bool) -> Result<SqlStatement> {
    let column_names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    let quoted = column_names
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");

    let mut params = Vec::with_capacity(rows.len() * column_names.len());
    let mut tuples = Vec::with_capacity(rows.len());
    let mut placeholder = 1;
    for row in rows {
        let mut slots = Vec::with_capacity(column_names.len());
        for column in &table.columns {
            let value = row.get(&column.name).cloned().unwrap_or(Value::Null);
            params.push(column.kind.encode(&column.name, &value)?);
            slots.push(format!("${placeholder}"));
            placeholder += 1;
        }
        tuples.push(format!("({})", slots.join(", ")));
    }

    let mut sql = format!(
        "INSERT INTO \"{}\" ({quoted}) VALUES {}",
        table.id,
        tuples.join(", ")
    );

    if on_conflict_update {
        let pk = table
            .primary_key_columns()
            .iter()
            .map(|c| format!("\"{}\"", c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let assignments = table
            .columns
            .iter()
            .filter(|c| !c.primary_key)
            .map(|c| format!("\"{0}\" = EXCLUDED.\"{0}\"", c.name))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" ON CONFLICT ({pk}) DO UPDATE SET {assignments}"));
    }

    Ok(SqlStatement::new(sql, params))
}

fn decode_row(table: &TableSchema, values: Vec<Value>) -> Result<Row> {
    if values.len() != table.columns.len() {
        return Err(StoreError::CheckConstraint {
            column: table.id.to_string(),
            message: format!(
                "row width {} does not match {} declared columns",
                values.len(),
                table.columns.len()
            ),
        }
        .into());
    }
    let mut row = Row::new();
    for (column, value) in table.columns.iter().zip(values) {
        row.insert(column.name.clone(), column.kind.decode(&column.name, &value)?);
    }
    Ok(row)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
