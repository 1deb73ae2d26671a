//! Sync store port: durable chain data plus interval bookkeeping.
//!
//! Interval rows are the source of truth for "what is cached". A blob
//! (block, log, transaction, trace) only counts as synced once an interval
//! row covering its block exists, so every insert writes blobs and the
//! interval row in the same transaction. The scheduler never assumes the
//! blob tables alone are complete.
//!
//! All inserts are idempotent under the same `(chain, source, interval,
//! data)`; re-running a task after a crash re-issues the same writes.

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::types::chain::{CallTraceFrame, ChainBlock, ChainLog, ChainReceipt, ChainTransaction};
use crate::types::interval::{Interval, IntervalSet};
use crate::types::source::{
    BlockIntervalSource, CallTraceSource, ChainId, FactoryCallTraceSource, FactoryCriteria,
    FactoryLogSource, LogFilterSource, SourceId,
};

// ═══════════════════════════════════════════════════════════════════════════════
// RPC REQUEST CACHE ROW
// ═══════════════════════════════════════════════════════════════════════════════

/// A memoized RPC response to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcRequestResult {
    /// Canonical request body (order-stable, lowercased JSON).
    pub request: String,
    /// Block the request was pinned to, if block-dependent.
    pub block_number: Option<u64>,
    /// Raw JSON result string.
    pub result: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYNC STORE PORT
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for durable sync data, shared by all chains.
///
/// Implementations serialize interval updates per `(chain, source)`;
/// concurrent calls from different chains are permitted.
#[async_trait]
pub trait SyncStore: Send + Sync {
    // ───────────────────────────────────────────────────────────────────────────
    // LOG FILTERS
    // ───────────────────────────────────────────────────────────────────────────

    /// Intervals already synced for a log filter, canonical form.
    ///
    /// `source_id` is passed separately from the filter because factory
    /// child discovery persists under a derived id
    /// ([`SourceId::child_discovery`]) while reusing the log-filter shape.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn get_log_filter_intervals(
        &self,
        chain_id: ChainId,
        source_id: &SourceId,
    ) -> Result<IntervalSet>;

    /// Atomically persist one synced piece of a log filter: the block, the
    /// matched transactions, the logs, and the covering interval row.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    async fn insert_log_filter_interval(
        &self,
        chain_id: ChainId,
        source_id: &SourceId,
        block: &ChainBlock,
        transactions: &[ChainTransaction],
        logs: &[ChainLog],
        interval: Interval,
    ) -> Result<()>;

    // ───────────────────────────────────────────────────────────────────────────
    // FACTORY LOG FILTERS
    // ───────────────────────────────────────────────────────────────────────────

    /// Intervals already synced for a factory log filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn get_factory_log_filter_intervals(
        &self,
        chain_id: ChainId,
        source: &FactoryLogSource,
    ) -> Result<IntervalSet>;

    /// Atomically persist one synced piece of a factory log filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    async fn insert_factory_log_filter_interval(
        &self,
        chain_id: ChainId,
        source: &FactoryLogSource,
        block: &ChainBlock,
        transactions: &[ChainTransaction],
        logs: &[ChainLog],
        interval: Interval,
    ) -> Result<()>;

    /// Record factory creation events from which child addresses are
    /// extracted.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    async fn insert_factory_child_address_logs(
        &self,
        chain_id: ChainId,
        factory: &FactoryCriteria,
        logs: &[ChainLog],
    ) -> Result<()>;

    /// Stream child addresses discovered at or before `up_to_block`, in
    /// batches of `batch_size`, ordered by address.
    fn get_factory_child_addresses(
        &self,
        chain_id: ChainId,
        factory: &FactoryCriteria,
        up_to_block: u64,
        batch_size: usize,
    ) -> BoxStream<'static, Result<Vec<Address>>>;

    // ───────────────────────────────────────────────────────────────────────────
    // TRACE FILTERS
    // ───────────────────────────────────────────────────────────────────────────

    /// Intervals already synced for a trace filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn get_trace_filter_intervals(
        &self,
        chain_id: ChainId,
        source: &CallTraceSource,
    ) -> Result<IntervalSet>;

    /// Atomically persist one synced piece of a trace filter: block,
    /// matched transactions, their receipts, the call traces, and the
    /// covering interval row.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
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
    ) -> Result<()>;

    /// Intervals already synced for a factory trace filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn get_factory_trace_filter_intervals(
        &self,
        chain_id: ChainId,
        source: &FactoryCallTraceSource,
    ) -> Result<IntervalSet>;

    /// Atomically persist one synced piece of a factory trace filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
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
    ) -> Result<()>;

    // ───────────────────────────────────────────────────────────────────────────
    // BLOCK FILTERS
    // ───────────────────────────────────────────────────────────────────────────

    /// Intervals already synced for a periodic block filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn get_block_filter_intervals(
        &self,
        chain_id: ChainId,
        source: &BlockIntervalSource,
    ) -> Result<IntervalSet>;

    /// Persist a covering interval row for a block filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    async fn insert_block_filter_interval(
        &self,
        chain_id: ChainId,
        source: &BlockIntervalSource,
        interval: Interval,
    ) -> Result<()>;

    // ───────────────────────────────────────────────────────────────────────────
    // BLOCKS
    // ───────────────────────────────────────────────────────────────────────────

    /// Fetch a stored block by number.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn get_block(&self, chain_id: ChainId, number: u64) -> Result<Option<ChainBlock>>;

    /// Persist a block (idempotent).
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    async fn insert_block(&self, chain_id: ChainId, block: &ChainBlock) -> Result<()>;

    // ───────────────────────────────────────────────────────────────────────────
    // RPC REQUEST CACHE
    // ───────────────────────────────────────────────────────────────────────────

    /// Look up memoized RPC responses for canonical request bodies.
    ///
    /// The result aligns positionally with `requests`; misses are `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn get_rpc_request_results(
        &self,
        chain_id: ChainId,
        requests: &[String],
    ) -> Result<Vec<Option<String>>>;

    /// Memoize RPC responses (idempotent per request hash).
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    async fn insert_rpc_request_results(
        &self,
        chain_id: ChainId,
        results: &[RpcRequestResult],
    ) -> Result<()>;
}

/// Extract the child address from a factory creation event log.
#[must_use]
pub fn extract_child_address(factory: &FactoryCriteria, log: &ChainLog) -> Option<Address> {
    use crate::types::source::ChildLocation;

    let word: B256 = match factory.child_location {
        ChildLocation::Topic(i) => *log.topics.get(i)?,
        ChildLocation::DataOffset(word_index) => {
            let start = word_index.checked_mul(32)?;
            let end = start.checked_add(32)?;
            if log.data.len() < end {
                return None;
            }
            B256::from_slice(&log.data[start..end])
        }
    };

    // Addresses occupy the low 20 bytes of the word; the high 12 must be
    // zero for a well-formed address parameter.
    if word[..12].iter().any(|b| *b != 0) {
        return None;
    }
    Some(Address::from_slice(&word[12..]))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
