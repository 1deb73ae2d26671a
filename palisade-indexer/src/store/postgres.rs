//! PostgreSQL adapters for the sync store and the user-table executor.
//!
//! # Type Conversions
//!
//! PostgreSQL uses signed integers for numeric columns while the domain
//! uses unsigned types. These casts are safe because block numbers, log
//! indexes, and gas values won't exceed `i64::MAX`. Hashes, addresses,
//! and byte payloads are stored as lowercase `0x`-hex text; wei values as
//! decimal text.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]

use std::collections::HashMap;

use alloy::primitives::{Address, B256, Bytes, U256, keccak256};
use async_trait::async_trait;
use futures::stream::BoxStream;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Column, Row as _, TypeInfo};
use tracing::{debug, instrument};

use crate::error::{AppError, Result};
use crate::ports::db::{DbExecutor, SqlStatement};
use crate::ports::sync_store::{RpcRequestResult, SyncStore, extract_child_address};
use crate::types::chain::{CallTraceFrame, ChainBlock, ChainLog, ChainReceipt, ChainTransaction};
use crate::types::interval::{Interval, IntervalSet};
use crate::types::row::Value;
use crate::types::source::{
    BlockIntervalSource, CallTraceSource, ChainId, FactoryCallTraceSource, FactoryCriteria,
    FactoryLogSource, LogFilterSource, SourceId,
};

// ═══════════════════════════════════════════════════════════════════════════════
// POSTGRES SYNC STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// sqlx-backed [`SyncStore`].
///
/// Shared by every chain; interval updates for one `(chain, source)` are
/// serialized by row locks inside their transaction.
#[derive(Debug, Clone)]
pub struct PostgresSyncStore {
    pool: PgPool,
}

impl PostgresSyncStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    async fn get_intervals(
        &self,
        table: &str,
        id_column: &str,
        chain_id: ChainId,
        filter_id: &str,
    ) -> Result<IntervalSet> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(&format!(
            "SELECT start_block, end_block FROM {table} WHERE chain_id = $1 AND {id_column} = $2"
        ))
        .bind(chain_id as i64)
        .bind(filter_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(lo, hi)| Interval::new(lo as u64, hi as u64))
            .collect())
    }

    /// Merge a new interval into a filter's rows, keeping them canonical.
    ///
    /// Runs inside the caller's transaction; `FOR UPDATE` serializes
    /// concurrent merges for the same filter.
    async fn merge_interval(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        table: &str,
        id_column: &str,
        chain_id: ChainId,
        filter_id: &str,
        interval: Interval,
    ) -> Result<()> {
        let existing: Vec<(i64, i64)> = sqlx::query_as(&format!(
            "SELECT start_block, end_block FROM {table} \
             WHERE chain_id = $1 AND {id_column} = $2 FOR UPDATE"
        ))
        .bind(chain_id as i64)
        .bind(filter_id)
        .fetch_all(&mut **tx)
        .await?;

        let mut intervals: Vec<Interval> = existing
            .into_iter()
            .map(|(lo, hi)| Interval::new(lo as u64, hi as u64))
            .collect();
        intervals.push(interval);
        let merged = IntervalSet::from_unsorted(intervals);

        sqlx::query(&format!(
            "DELETE FROM {table} WHERE chain_id = $1 AND {id_column} = $2"
        ))
        .bind(chain_id as i64)
        .bind(filter_id)
        .execute(&mut **tx)
        .await?;

        for iv in merged.intervals() {
            sqlx::query(&format!(
                "INSERT INTO {table} (chain_id, {id_column}, start_block, end_block) \
                 VALUES ($1, $2, $3, $4)"
            ))
            .bind(chain_id as i64)
            .bind(filter_id)
            .bind(iv.lo as i64)
            .bind(iv.hi as i64)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn insert_block_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        chain_id: ChainId,
        block: &ChainBlock,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO blocks (chain_id, hash, parent_hash, number, timestamp) \
             VALUES ($1, $2, $3, $4, $5) ON CONFLICT DO NOTHING",
        )
        .bind(chain_id as i64)
        .bind(hex_b256(block.hash))
        .bind(hex_b256(block.parent_hash))
        .bind(block.number as i64)
        .bind(block.timestamp as i64)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_transactions_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        chain_id: ChainId,
        block: &ChainBlock,
        transactions: &[ChainTransaction],
    ) -> Result<()> {
        for transaction in transactions {
            sqlx::query(
                "INSERT INTO transactions \
                 (chain_id, hash, block_hash, block_number, transaction_index, \"from\", \"to\", value, input) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) ON CONFLICT DO NOTHING",
            )
            .bind(chain_id as i64)
            .bind(hex_b256(transaction.hash))
            .bind(hex_b256(block.hash))
            .bind(block.number as i64)
            .bind(transaction.transaction_index as i64)
            .bind(hex_address(transaction.from))
            .bind(transaction.to.map(hex_address))
            .bind(transaction.value.to_string())
            .bind(hex_bytes(&transaction.input))
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn insert_logs_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        chain_id: ChainId,
        logs: &[ChainLog],
    ) -> Result<()> {
        for log in logs {
            sqlx::query(
                "INSERT INTO logs \
                 (chain_id, block_hash, log_index, block_number, address, \
                  topic0, topic1, topic2, topic3, data, tx_hash) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(chain_id as i64)
            .bind(hex_b256(log.block_hash))
            .bind(log.log_index as i64)
            .bind(log.block_number as i64)
            .bind(hex_address(log.address))
            .bind(log.topics.first().copied().map(hex_b256))
            .bind(log.topics.get(1).copied().map(hex_b256))
            .bind(log.topics.get(2).copied().map(hex_b256))
            .bind(log.topics.get(3).copied().map(hex_b256))
            .bind(hex_bytes(&log.data))
            .bind(hex_b256(log.transaction_hash))
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn insert_receipts_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        chain_id: ChainId,
        receipts: &[ChainReceipt],
    ) -> Result<()> {
        for receipt in receipts {
            sqlx::query(
                "INSERT INTO transaction_receipts \
                 (chain_id, hash, block_hash, block_number, status, gas_used) \
                 VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT DO NOTHING",
            )
            .bind(chain_id as i64)
            .bind(hex_b256(receipt.transaction_hash))
            .bind(hex_b256(receipt.block_hash))
            .bind(receipt.block_number as i64)
            .bind(receipt.status)
            .bind(receipt.gas_used as i64)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn insert_traces_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        chain_id: ChainId,
        traces: &[CallTraceFrame],
    ) -> Result<()> {
        for trace in traces {
            let trace_address = trace
                .trace_address
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(".");
            sqlx::query(
                "INSERT INTO call_traces \
                 (chain_id, block_hash, tx_hash, trace_address, block_number, \
                  \"from\", \"to\", input, output, value) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(chain_id as i64)
            .bind(hex_b256(trace.block_hash))
            .bind(hex_b256(trace.transaction_hash))
            .bind(trace_address)
            .bind(trace.block_number as i64)
            .bind(hex_address(trace.from))
            .bind(hex_address(trace.to))
            .bind(hex_bytes(&trace.input))
            .bind(trace.output.as_ref().map(hex_bytes))
            .bind(trace.value.to_string())
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl SyncStore for PostgresSyncStore {
    async fn get_log_filter_intervals(
        &self,
        chain_id: ChainId,
        source_id: &SourceId,
    ) -> Result<IntervalSet> {
        self.get_intervals(
            "log_filter_intervals",
            "log_filter_id",
            chain_id,
            source_id.as_str(),
        )
        .await
    }

    #[instrument(skip_all, fields(source = %source_id, interval = %interval))]
    async fn insert_log_filter_interval(
        &self,
        chain_id: ChainId,
        source_id: &SourceId,
        block: &ChainBlock,
        transactions: &[ChainTransaction],
        logs: &[ChainLog],
        interval: Interval,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_block_tx(&mut tx, chain_id, block).await?;
        Self::insert_transactions_tx(&mut tx, chain_id, block, transactions).await?;
        Self::insert_logs_tx(&mut tx, chain_id, logs).await?;
        Self::merge_interval(
            &mut tx,
            "log_filter_intervals",
            "log_filter_id",
            chain_id,
            source_id.as_str(),
            interval,
        )
        .await?;
        tx.commit().await?;
        debug!(logs = logs.len(), "Persisted log filter interval");
        Ok(())
    }

    async fn get_factory_log_filter_intervals(
        &self,
        chain_id: ChainId,
        source: &FactoryLogSource,
    ) -> Result<IntervalSet> {
        self.get_intervals(
            "factory_log_filter_intervals",
            "factory_id",
            chain_id,
            source.id.as_str(),
        )
        .await
    }

    async fn insert_factory_log_filter_interval(
        &self,
        chain_id: ChainId,
        source: &FactoryLogSource,
        block: &ChainBlock,
        transactions: &[ChainTransaction],
        logs: &[ChainLog],
        interval: Interval,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_block_tx(&mut tx, chain_id, block).await?;
        Self::insert_transactions_tx(&mut tx, chain_id, block, transactions).await?;
        Self::insert_logs_tx(&mut tx, chain_id, logs).await?;
        Self::merge_interval(
            &mut tx,
            "factory_log_filter_intervals",
            "factory_id",
            chain_id,
            source.id.as_str(),
            interval,
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_factory_child_address_logs(
        &self,
        chain_id: ChainId,
        factory: &FactoryCriteria,
        logs: &[ChainLog],
    ) -> Result<()> {
        let key = factory_key(factory);
        let mut tx = self.pool.begin().await?;
        for log in logs {
            let Some(child) = extract_child_address(factory, log) else {
                continue;
            };
            sqlx::query(
                "INSERT INTO factory_child_address_logs \
                 (chain_id, factory_key, child_address, block_number) \
                 VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
            )
            .bind(chain_id as i64)
            .bind(&key)
            .bind(hex_address(child))
            .bind(log.block_number as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    fn get_factory_child_addresses(
        &self,
        chain_id: ChainId,
        factory: &FactoryCriteria,
        up_to_block: u64,
        batch_size: usize,
    ) -> BoxStream<'static, Result<Vec<Address>>> {
        let pool = self.pool.clone();
        let key = factory_key(factory);

        Box::pin(futures::stream::try_unfold(
            Some(String::new()),
            move |cursor| {
                let pool = pool.clone();
                let key = key.clone();
                async move {
                    let Some(after) = cursor else {
                        return Ok(None);
                    };
                    let rows: Vec<(String,)> = sqlx::query_as(
                        "SELECT child_address FROM factory_child_address_logs \
                         WHERE chain_id = $1 AND factory_key = $2 \
                           AND block_number <= $3 AND child_address > $4 \
                         ORDER BY child_address LIMIT $5",
                    )
                    .bind(chain_id as i64)
                    .bind(&key)
                    .bind(up_to_block as i64)
                    .bind(&after)
                    .bind(batch_size as i64)
                    .fetch_all(&pool)
                    .await
                    .map_err(AppError::Database)?;

                    if rows.is_empty() {
                        return Ok(None);
                    }
                    let next = rows.last().map(|(a,)| a.clone());
                    let addresses = rows
                        .into_iter()
                        .map(|(a,)| parse_address(&a))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Some((addresses, next)))
                }
            },
        ))
    }

    async fn get_trace_filter_intervals(
        &self,
        chain_id: ChainId,
        source: &CallTraceSource,
    ) -> Result<IntervalSet> {
        self.get_intervals(
            "trace_filter_intervals",
            "trace_filter_id",
            chain_id,
            source.id.as_str(),
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_trace_filter_interval(
        &self,
        chain_id: ChainId,
        source: &CallTraceSource,
        block: &ChainBlock,
        transactions: &[ChainTransaction],
        receipts: &[ChainReceipt],
        traces: &[CallTraceFrame],
        interval: Interval,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_block_tx(&mut tx, chain_id, block).await?;
        Self::insert_transactions_tx(&mut tx, chain_id, block, transactions).await?;
        Self::insert_receipts_tx(&mut tx, chain_id, receipts).await?;
        Self::insert_traces_tx(&mut tx, chain_id, traces).await?;
        Self::merge_interval(
            &mut tx,
            "trace_filter_intervals",
            "trace_filter_id",
            chain_id,
            source.id.as_str(),
            interval,
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_factory_trace_filter_intervals(
        &self,
        chain_id: ChainId,
        source: &FactoryCallTraceSource,
    ) -> Result<IntervalSet> {
        self.get_intervals(
            "factory_trace_filter_intervals",
            "factory_id",
            chain_id,
            source.id.as_str(),
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_factory_trace_filter_interval(
        &self,
        chain_id: ChainId,
        source: &FactoryCallTraceSource,
        block: &ChainBlock,
        transactions: &[ChainTransaction],
        receipts: &[ChainReceipt],
        traces: &[CallTraceFrame],
        interval: Interval,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_block_tx(&mut tx, chain_id, block).await?;
        Self::insert_transactions_tx(&mut tx, chain_id, block, transactions).await?;
        Self::insert_receipts_tx(&mut tx, chain_id, receipts).await?;
        Self::insert_traces_tx(&mut tx, chain_id, traces).await?;
        Self::merge_interval(
            &mut tx,
            "factory_trace_filter_intervals",
            "factory_id",
            chain_id,
            source.id.as_str(),
            interval,
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_block_filter_intervals(
        &self,
        chain_id: ChainId,
        source: &BlockIntervalSource,
    ) -> Result<IntervalSet> {
        self.get_intervals(
            "block_filter_intervals",
            "block_filter_id",
            chain_id,
            source.id.as_str(),
        )
        .await
    }

    async fn insert_block_filter_interval(
        &self,
        chain_id: ChainId,
        source: &BlockIntervalSource,
        interval: Interval,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::merge_interval(
            &mut tx,
            "block_filter_intervals",
            "block_filter_id",
            chain_id,
            source.id.as_str(),
            interval,
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_block(&self, chain_id: ChainId, number: u64) -> Result<Option<ChainBlock>> {
        let header: Option<(String, String, i64)> = sqlx::query_as(
            "SELECT hash, parent_hash, timestamp FROM blocks \
             WHERE chain_id = $1 AND number = $2",
        )
        .bind(chain_id as i64)
        .bind(number as i64)
        .fetch_optional(&self.pool)
        .await?;

        let Some((hash, parent_hash, timestamp)) = header else {
            return Ok(None);
        };

        let tx_rows: Vec<(String, i64, String, Option<String>, String, String)> = sqlx::query_as(
            "SELECT hash, transaction_index, \"from\", \"to\", value, input \
             FROM transactions WHERE chain_id = $1 AND block_hash = $2 \
             ORDER BY transaction_index",
        )
        .bind(chain_id as i64)
        .bind(&hash)
        .fetch_all(&self.pool)
        .await?;

        let transactions = tx_rows
            .into_iter()
            .map(|(tx_hash, index, from, to, value, input)| {
                Ok(ChainTransaction {
                    hash: parse_b256(&tx_hash)?,
                    transaction_index: index as u64,
                    from: parse_address(&from)?,
                    to: to.as_deref().map(parse_address).transpose()?,
                    value: parse_u256(&value)?,
                    input: parse_bytes(&input)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(ChainBlock {
            hash: parse_b256(&hash)?,
            parent_hash: parse_b256(&parent_hash)?,
            number,
            timestamp: timestamp as u64,
            transactions,
        }))
    }

    async fn insert_block(&self, chain_id: ChainId, block: &ChainBlock) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_block_tx(&mut tx, chain_id, block).await?;
        Self::insert_transactions_tx(&mut tx, chain_id, block, &block.transactions).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_rpc_request_results(
        &self,
        chain_id: ChainId,
        requests: &[String],
    ) -> Result<Vec<Option<String>>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let hashes: Vec<String> = requests.iter().map(|r| request_hash(r)).collect();

        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT request_hash, result FROM rpc_request_results \
             WHERE chain_id = $1 AND request_hash = ANY($2)",
        )
        .bind(chain_id as i64)
        .bind(&hashes)
        .fetch_all(&self.pool)
        .await?;

        let found: HashMap<String, String> = rows.into_iter().collect();
        Ok(hashes.iter().map(|h| found.get(h).cloned()).collect())
    }

    async fn insert_rpc_request_results(
        &self,
        chain_id: ChainId,
        results: &[RpcRequestResult],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for result in results {
            sqlx::query(
                "INSERT INTO rpc_request_results \
                 (chain_id, request_hash, block_number, result) \
                 VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
            )
            .bind(chain_id as i64)
            .bind(request_hash(&result.request))
            .bind(result.block_number.map(|n| n as i64))
            .bind(&result.result)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// POSTGRES EXECUTOR
// ═══════════════════════════════════════════════════════════════════════════════

/// sqlx-backed [`DbExecutor`] for user on-chain tables.
#[derive(Debug, Clone)]
pub struct PostgresExecutor {
    pool: PgPool,
}

impl PostgresExecutor {
    /// Create an executor over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn bind_params<'q>(
        stmt: &'q SqlStatement,
        mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        for value in &stmt.params {
            query = match value {
                Value::Null => query.bind(None::<String>),
                Value::Bool(b) => query.bind(*b),
                Value::Int(i) => query.bind(*i),
                Value::Float(f) => query.bind(*f),
                // Storage encoding renders these as text before they reach
                // the executor; these arms cover values passed through raw.
                Value::BigInt(i) => query.bind(i.to_string()),
                Value::String(s) => query.bind(s.clone()),
                Value::Hex(b) => query.bind(hex_bytes(b)),
                Value::List(_) => query.bind(value.to_json().to_string()),
            };
        }
        query
    }
}

#[async_trait]
impl DbExecutor for PostgresExecutor {
    async fn query(&self, stmt: SqlStatement) -> Result<Vec<Vec<Value>>> {
        let query = Self::bind_params(&stmt, sqlx::query(&stmt.sql));
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(decode_pg_row).collect()
    }

    async fn execute(&self, stmt: SqlStatement) -> Result<u64> {
        let query = Self::bind_params(&stmt, sqlx::query(&stmt.sql));
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn execute_batch(&self, stmts: Vec<SqlStatement>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for stmt in &stmts {
            let query = Self::bind_params(stmt, sqlx::query(&stmt.sql));
            query.execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn decode_pg_row(row: &PgRow) -> Result<Vec<Value>> {
    let mut values = Vec::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "BOOL" => row
                .try_get::<Option<bool>, _>(index)?
                .map_or(Value::Null, Value::Bool),
            "INT2" => row
                .try_get::<Option<i16>, _>(index)?
                .map_or(Value::Null, |v| Value::Int(i64::from(v))),
            "INT4" => row
                .try_get::<Option<i32>, _>(index)?
                .map_or(Value::Null, |v| Value::Int(i64::from(v))),
            "INT8" => row
                .try_get::<Option<i64>, _>(index)?
                .map_or(Value::Null, Value::Int),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(index)?
                .map_or(Value::Null, |v| Value::Float(f64::from(v))),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(index)?
                .map_or(Value::Null, Value::Float),
            _ => row
                .try_get::<Option<String>, _>(index)?
                .map_or(Value::Null, Value::String),
        };
        values.push(value);
    }
    Ok(values)
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENCODING HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn hex_b256(hash: B256) -> String {
    format!("0x{}", hex::encode(hash))
}

fn hex_address(address: Address) -> String {
    format!("0x{}", hex::encode(address))
}

fn hex_bytes(bytes: &Bytes) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Stable identity for a factory's child-address rows.
fn factory_key(factory: &FactoryCriteria) -> String {
    format!(
        "{}:{}:{:?}",
        hex_address(factory.address),
        hex_b256(factory.event_selector),
        factory.child_location
    )
}

/// Key for the RPC request-result cache: keccak of the canonical body.
fn request_hash(request: &str) -> String {
    format!("0x{}", hex::encode(keccak256(request.as_bytes())))
}

fn decode_err(message: String) -> AppError {
    AppError::Database(sqlx::Error::Decode(message.into()))
}

fn parse_b256(s: &str) -> Result<B256> {
    s.parse()
        .map_err(|_| decode_err(format!("invalid hash in database: {s}")))
}

fn parse_address(s: &str) -> Result<Address> {
    s.parse()
        .map_err(|_| decode_err(format!("invalid address in database: {s}")))
}

fn parse_u256(s: &str) -> Result<U256> {
    s.parse()
        .map_err(|_| decode_err(format!("invalid wei value in database: {s}")))
}

fn parse_bytes(s: &str) -> Result<Bytes> {
    s.parse()
        .map_err(|_| decode_err(format!("invalid byte payload in database: {s}")))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
