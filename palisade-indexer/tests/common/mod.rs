//! Common test utilities and infrastructure.
//!
//! In-memory implementations of the three ports (`SyncStore`,
//! `RpcClient`, `DbExecutor`) plus fixture builders shared by the
//! integration tests.
#![allow(dead_code, clippy::unwrap_used, clippy::too_many_arguments)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use serde_json::{Value as JsonValue, json};

use palisade_indexer::error::{AppError, Result, RpcError, RpcResult};
use palisade_indexer::ports::db::{DbExecutor, SqlStatement};
use palisade_indexer::ports::rpc::{LogQuery, RpcClient, TraceQuery};
use palisade_indexer::ports::sync_store::{RpcRequestResult, SyncStore, extract_child_address};
use palisade_indexer::types::chain::{
    CallTraceFrame, ChainBlock, ChainLog, ChainReceipt, ChainTransaction,
};
use palisade_indexer::types::interval::{Interval, IntervalSet};
use palisade_indexer::types::row::Value;
use palisade_indexer::types::source::{
    BlockIntervalSource, CallTraceSource, ChainId, FactoryCallTraceSource, FactoryCriteria,
    FactoryLogSource, LogFilterSource, SourceId,
};

// ═══════════════════════════════════════════════════════════════════════════════
// FIXTURES
// ═══════════════════════════════════════════════════════════════════════════════

/// Deterministic block hash for a height.
pub fn block_hash(number: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&number.to_be_bytes());
    bytes[0] = 0xB1;
    B256::from(bytes)
}

/// Deterministic block with no transactions.
pub fn make_block(number: u64) -> ChainBlock {
    ChainBlock {
        hash: block_hash(number),
        parent_hash: block_hash(number.saturating_sub(1)),
        number,
        timestamp: number * 10,
        transactions: Vec::new(),
    }
}

/// Deterministic block containing the given transactions.
pub fn make_block_with_txs(number: u64, transactions: Vec<ChainTransaction>) -> ChainBlock {
    ChainBlock {
        transactions,
        ..make_block(number)
    }
}

/// A transaction with a recognizable hash.
pub fn make_tx(seed: u8) -> ChainTransaction {
    ChainTransaction {
        hash: B256::repeat_byte(seed),
        transaction_index: u64::from(seed),
        from: Address::repeat_byte(seed),
        to: Some(Address::repeat_byte(seed ^ 0xFF)),
        value: U256::from(u64::from(seed)),
        input: Bytes::new(),
    }
}

/// A log at a block with a given topic0 and emitting address.
pub fn make_log(block: u64, log_index: u64, address: Address, topic0: B256) -> ChainLog {
    ChainLog {
        address,
        topics: vec![topic0],
        data: Bytes::new(),
        block_number: block,
        block_hash: block_hash(block),
        log_index,
        transaction_hash: B256::repeat_byte(0xCC),
    }
}

/// A 32-byte word with an address in the low 20 bytes.
pub fn address_word(address: Address) -> B256 {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_slice());
    B256::from(word)
}

fn factory_identity(factory: &FactoryCriteria) -> String {
    format!("{factory:?}")
}

// ═══════════════════════════════════════════════════════════════════════════════
// MEMORY SYNC STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Counters of blob writes, for behavioral assertions.
#[derive(Debug, Default, Clone)]
pub struct SyncStoreCounters {
    pub log_filter_inserts: usize,
    pub factory_log_filter_inserts: usize,
    pub trace_filter_inserts: usize,
    pub block_filter_inserts: usize,
    pub blocks_inserted: usize,
    pub logs_inserted: usize,
    pub traces_inserted: usize,
}

#[derive(Default)]
struct SyncStoreState {
    log_intervals: HashMap<(ChainId, String), IntervalSet>,
    factory_log_intervals: HashMap<(ChainId, String), IntervalSet>,
    trace_intervals: HashMap<(ChainId, String), IntervalSet>,
    factory_trace_intervals: HashMap<(ChainId, String), IntervalSet>,
    block_intervals: HashMap<(ChainId, String), IntervalSet>,
    blocks: HashMap<(ChainId, u64), ChainBlock>,
    children: HashMap<(ChainId, String), BTreeMap<Address, u64>>,
    rpc_results: HashMap<(ChainId, String), String>,
    counters: SyncStoreCounters,
}

/// In-memory [`SyncStore`].
#[derive(Default)]
pub struct MemorySyncStore {
    state: Mutex<SyncStoreState>,
}

impl MemorySyncStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed persisted intervals for a log filter (or child discovery) id.
    pub fn seed_log_intervals(&self, chain_id: ChainId, id: &SourceId, ranges: &[(u64, u64)]) {
        let set = ranges
            .iter()
            .map(|&(lo, hi)| Interval::new(lo, hi))
            .collect();
        self.state
            .lock()
            .log_intervals
            .insert((chain_id, id.as_str().to_string()), set);
    }

    /// Seed discovered child addresses for a factory.
    pub fn seed_children(
        &self,
        chain_id: ChainId,
        factory: &FactoryCriteria,
        children: &[(Address, u64)],
    ) {
        let mut state = self.state.lock();
        let map = state
            .children
            .entry((chain_id, factory_identity(factory)))
            .or_default();
        for &(address, block) in children {
            map.insert(address, block);
        }
    }

    pub fn log_intervals(&self, chain_id: ChainId, id: &SourceId) -> IntervalSet {
        self.state
            .lock()
            .log_intervals
            .get(&(chain_id, id.as_str().to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn factory_log_intervals(&self, chain_id: ChainId, id: &SourceId) -> IntervalSet {
        self.state
            .lock()
            .factory_log_intervals
            .get(&(chain_id, id.as_str().to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn block_intervals(&self, chain_id: ChainId, id: &SourceId) -> IntervalSet {
        self.state
            .lock()
            .block_intervals
            .get(&(chain_id, id.as_str().to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn trace_intervals(&self, chain_id: ChainId, id: &SourceId) -> IntervalSet {
        self.state
            .lock()
            .trace_intervals
            .get(&(chain_id, id.as_str().to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn counters(&self) -> SyncStoreCounters {
        self.state.lock().counters.clone()
    }

    pub fn stored_block(&self, chain_id: ChainId, number: u64) -> Option<ChainBlock> {
        self.state.lock().blocks.get(&(chain_id, number)).cloned()
    }

    pub fn rpc_result_count(&self) -> usize {
        self.state.lock().rpc_results.len()
    }

    fn merge(map: &mut HashMap<(ChainId, String), IntervalSet>, key: (ChainId, String), interval: Interval) {
        let set = map.entry(key).or_default();
        *set = set.union(&IntervalSet::of(interval.lo, interval.hi));
    }
}

#[async_trait]
impl SyncStore for MemorySyncStore {
    async fn get_log_filter_intervals(
        &self,
        chain_id: ChainId,
        source_id: &SourceId,
    ) -> Result<IntervalSet> {
        Ok(self.log_intervals(chain_id, source_id))
    }

    async fn insert_log_filter_interval(
        &self,
        chain_id: ChainId,
        source_id: &SourceId,
        block: &ChainBlock,
        _transactions: &[ChainTransaction],
        logs: &[ChainLog],
        interval: Interval,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.blocks.insert((chain_id, block.number), block.clone());
        state.counters.log_filter_inserts += 1;
        state.counters.blocks_inserted += 1;
        state.counters.logs_inserted += logs.len();
        Self::merge(
            &mut state.log_intervals,
            (chain_id, source_id.as_str().to_string()),
            interval,
        );
        Ok(())
    }

    async fn get_factory_log_filter_intervals(
        &self,
        chain_id: ChainId,
        source: &FactoryLogSource,
    ) -> Result<IntervalSet> {
        Ok(self.factory_log_intervals(chain_id, &source.id))
    }

    async fn insert_factory_log_filter_interval(
        &self,
        chain_id: ChainId,
        source: &FactoryLogSource,
        block: &ChainBlock,
        _transactions: &[ChainTransaction],
        logs: &[ChainLog],
        interval: Interval,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.blocks.insert((chain_id, block.number), block.clone());
        state.counters.factory_log_filter_inserts += 1;
        state.counters.logs_inserted += logs.len();
        Self::merge(
            &mut state.factory_log_intervals,
            (chain_id, source.id.as_str().to_string()),
            interval,
        );
        Ok(())
    }

    async fn insert_factory_child_address_logs(
        &self,
        chain_id: ChainId,
        factory: &FactoryCriteria,
        logs: &[ChainLog],
    ) -> Result<()> {
        let mut state = self.state.lock();
        let map = state
            .children
            .entry((chain_id, factory_identity(factory)))
            .or_default();
        for log in logs {
            if let Some(child) = extract_child_address(factory, log) {
                map.entry(child).or_insert(log.block_number);
            }
        }
        Ok(())
    }

    fn get_factory_child_addresses(
        &self,
        chain_id: ChainId,
        factory: &FactoryCriteria,
        up_to_block: u64,
        batch_size: usize,
    ) -> BoxStream<'static, Result<Vec<Address>>> {
        let children: Vec<Address> = self
            .state
            .lock()
            .children
            .get(&(chain_id, factory_identity(factory)))
            .map(|map| {
                map.iter()
                    .filter(|(_, &block)| block <= up_to_block)
                    .map(|(&address, _)| address)
                    .collect()
            })
            .unwrap_or_default();

        let batches: Vec<Result<Vec<Address>>> = children
            .chunks(batch_size.max(1))
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();
        Box::pin(futures::stream::iter(batches))
    }

    async fn get_trace_filter_intervals(
        &self,
        chain_id: ChainId,
        source: &CallTraceSource,
    ) -> Result<IntervalSet> {
        Ok(self.trace_intervals(chain_id, &source.id))
    }

    async fn insert_trace_filter_interval(
        &self,
        chain_id: ChainId,
        source: &CallTraceSource,
        block: &ChainBlock,
        _transactions: &[ChainTransaction],
        _receipts: &[ChainReceipt],
        traces: &[CallTraceFrame],
        interval: Interval,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.blocks.insert((chain_id, block.number), block.clone());
        state.counters.trace_filter_inserts += 1;
        state.counters.traces_inserted += traces.len();
        Self::merge(
            &mut state.trace_intervals,
            (chain_id, source.id.as_str().to_string()),
            interval,
        );
        Ok(())
    }

    async fn get_factory_trace_filter_intervals(
        &self,
        chain_id: ChainId,
        source: &FactoryCallTraceSource,
    ) -> Result<IntervalSet> {
        Ok(self
            .state
            .lock()
            .factory_trace_intervals
            .get(&(chain_id, source.id.as_str().to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_factory_trace_filter_interval(
        &self,
        chain_id: ChainId,
        source: &FactoryCallTraceSource,
        block: &ChainBlock,
        _transactions: &[ChainTransaction],
        _receipts: &[ChainReceipt],
        traces: &[CallTraceFrame],
        interval: Interval,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.blocks.insert((chain_id, block.number), block.clone());
        state.counters.traces_inserted += traces.len();
        Self::merge(
            &mut state.factory_trace_intervals,
            (chain_id, source.id.as_str().to_string()),
            interval,
        );
        Ok(())
    }

    async fn get_block_filter_intervals(
        &self,
        chain_id: ChainId,
        source: &BlockIntervalSource,
    ) -> Result<IntervalSet> {
        Ok(self.block_intervals(chain_id, &source.id))
    }

    async fn insert_block_filter_interval(
        &self,
        chain_id: ChainId,
        source: &BlockIntervalSource,
        interval: Interval,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.counters.block_filter_inserts += 1;
        Self::merge(
            &mut state.block_intervals,
            (chain_id, source.id.as_str().to_string()),
            interval,
        );
        Ok(())
    }

    async fn get_block(&self, chain_id: ChainId, number: u64) -> Result<Option<ChainBlock>> {
        Ok(self.state.lock().blocks.get(&(chain_id, number)).cloned())
    }

    async fn insert_block(&self, chain_id: ChainId, block: &ChainBlock) -> Result<()> {
        let mut state = self.state.lock();
        state.counters.blocks_inserted += 1;
        state.blocks.insert((chain_id, block.number), block.clone());
        Ok(())
    }

    async fn get_rpc_request_results(
        &self,
        chain_id: ChainId,
        requests: &[String],
    ) -> Result<Vec<Option<String>>> {
        let state = self.state.lock();
        Ok(requests
            .iter()
            .map(|request| state.rpc_results.get(&(chain_id, request.clone())).cloned())
            .collect())
    }

    async fn insert_rpc_request_results(
        &self,
        chain_id: ChainId,
        results: &[RpcRequestResult],
    ) -> Result<()> {
        let mut state = self.state.lock();
        for result in results {
            state
                .rpc_results
                .insert((chain_id, result.request.clone()), result.result.clone());
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MOCK RPC
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory [`RpcClient`].
///
/// Blocks are generated deterministically on demand; logs, traces, and
/// receipts are seeded by tests. Raw `eth_call` requests answer from a
/// per-`(target, calldata)` result table, including decoded `aggregate3`
/// batches.
#[derive(Default)]
pub struct MockRpc {
    logs: Mutex<Vec<ChainLog>>,
    traces: Mutex<Vec<CallTraceFrame>>,
    receipts: Mutex<HashMap<B256, ChainReceipt>>,
    missing_blocks: Mutex<HashMap<u64, usize>>,
    call_results: Mutex<HashMap<(Address, Bytes), Bytes>>,
    pub log_queries: Mutex<Vec<LogQuery>>,
    pub trace_queries: Mutex<Vec<TraceQuery>>,
    pub raw_requests: Mutex<Vec<(String, JsonValue)>>,
    pub block_fetches: AtomicUsize,
}

mod multicall_abi {
    alloy::sol! {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result3 {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls) external payable returns (Result3[] memory returnData);
    }
}

impl MockRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_logs(&self, logs: Vec<ChainLog>) {
        self.logs.lock().extend(logs);
    }

    pub fn seed_traces(&self, traces: Vec<CallTraceFrame>) {
        self.traces.lock().extend(traces);
    }

    pub fn seed_receipt(&self, receipt: ChainReceipt) {
        self.receipts
            .lock()
            .insert(receipt.transaction_hash, receipt);
    }

    /// Make a block unknown for the next `times` fetches (simulates a
    /// lagging node).
    pub fn set_block_missing_times(&self, number: u64, times: usize) {
        self.missing_blocks.lock().insert(number, times);
    }

    /// Seed the return data for an `eth_call` to `(target, calldata)`.
    pub fn seed_call(&self, target: Address, calldata: Bytes, result: Bytes) {
        self.call_results.lock().insert((target, calldata), result);
    }

    /// Upstream `eth_call` bodies observed, decoded to inner-call counts
    /// when they were `aggregate3` batches.
    pub fn multicall_inner_counts(&self) -> Vec<usize> {
        use alloy::sol_types::SolCall;
        self.raw_requests
            .lock()
            .iter()
            .filter(|(method, _)| method == "eth_call")
            .filter_map(|(_, params)| {
                let data = params.get(0)?.get("data")?.as_str()?;
                let bytes = hex::decode(data.strip_prefix("0x")?).ok()?;
                let call = multicall_abi::aggregate3Call::abi_decode(&bytes).ok()?;
                Some(call.calls.len())
            })
            .collect()
    }

    fn answer_call(&self, target: Address, calldata: &Bytes) -> (bool, Bytes) {
        self.call_results
            .lock()
            .get(&(target, calldata.clone()))
            .map_or((false, Bytes::new()), |result| (true, result.clone()))
    }
}

#[async_trait]
impl RpcClient for MockRpc {
    async fn get_logs(&self, query: &LogQuery) -> RpcResult<Vec<ChainLog>> {
        self.log_queries.lock().push(query.clone());
        let logs = self.logs.lock();
        Ok(logs
            .iter()
            .filter(|log| {
                (query.from_block..=query.to_block).contains(&log.block_number)
                    && query
                        .addresses
                        .as_ref()
                        .is_none_or(|addresses| addresses.contains(&log.address))
                    && query.topics[0]
                        .as_ref()
                        .is_none_or(|topic0| log.topics.first().is_some_and(|t| topic0.contains(t)))
            })
            .cloned()
            .collect())
    }

    async fn get_block_by_number(&self, number: u64) -> RpcResult<Option<ChainBlock>> {
        self.block_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(remaining) = self.missing_blocks.lock().get_mut(&number)
            && *remaining > 0
        {
            *remaining -= 1;
            return Ok(None);
        }
        Ok(Some(make_block(number)))
    }

    async fn get_transaction_receipt(&self, hash: B256) -> RpcResult<Option<ChainReceipt>> {
        if let Some(receipt) = self.receipts.lock().get(&hash) {
            return Ok(Some(receipt.clone()));
        }
        // Unseeded receipts default to success.
        Ok(Some(ChainReceipt {
            transaction_hash: hash,
            block_number: 0,
            block_hash: block_hash(0),
            status: true,
            gas_used: 21_000,
        }))
    }

    async fn trace_filter(&self, query: &TraceQuery) -> RpcResult<Vec<CallTraceFrame>> {
        self.trace_queries.lock().push(query.clone());
        let traces = self.traces.lock();
        Ok(traces
            .iter()
            .filter(|trace| {
                (query.from_block..=query.to_block).contains(&trace.block_number)
                    && query
                        .to_addresses
                        .as_ref()
                        .is_none_or(|addresses| addresses.contains(&trace.to))
            })
            .cloned()
            .collect())
    }

    async fn request(&self, method: &str, params: &JsonValue) -> RpcResult<JsonValue> {
        use alloy::sol_types::{SolCall, SolValue};

        self.raw_requests
            .lock()
            .push((method.to_string(), params.clone()));

        if method == "eth_blockNumber" {
            return Ok(json!("0x1000"));
        }
        if method != "eth_call" {
            return Err(RpcError::Transport(format!("unmocked method {method}")));
        }

        let call = params.get(0).ok_or_else(|| {
            RpcError::Malformed("eth_call without call object".to_string())
        })?;
        let to: Address = call
            .get("to")
            .and_then(JsonValue::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| RpcError::Malformed("eth_call without to".to_string()))?;
        let data = call
            .get("data")
            .and_then(JsonValue::as_str)
            .and_then(|s| hex::decode(s.strip_prefix("0x").unwrap_or(s)).ok())
            .map(Bytes::from)
            .ok_or_else(|| RpcError::Malformed("eth_call without data".to_string()))?;

        // aggregate3 batches answer per inner call.
        if data.starts_with(&multicall_abi::aggregate3Call::SELECTOR) {
            let decoded = multicall_abi::aggregate3Call::abi_decode(&data)
                .map_err(|e| RpcError::Malformed(e.to_string()))?;
            let results: Vec<multicall_abi::Result3> = decoded
                .calls
                .iter()
                .map(|inner| {
                    let (success, return_data) = self.answer_call(inner.target, &inner.callData);
                    multicall_abi::Result3 {
                        success,
                        returnData: return_data,
                    }
                })
                .collect();
            return Ok(json!(format!("0x{}", hex::encode(results.abi_encode()))));
        }

        let (success, result) = self.answer_call(to, &data);
        if !success {
            return Ok(json!("0x"));
        }
        Ok(json!(format!("0x{}", hex::encode(result))))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MOCK DB EXECUTOR
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory [`DbExecutor`] that enforces primary-key uniqueness on plain
/// `INSERT` batches, like the real database would.
///
/// Statement parsing is deliberately shallow: the table name is read from
/// the statement text and the primary key is taken to be the first column
/// of each bound row (matching the schemas used in these tests).
#[derive(Default)]
pub struct MemoryDb {
    pub statements: Mutex<Vec<SqlStatement>>,
    pub query_results: Mutex<Vec<Vec<Vec<Value>>>>,
    inserted_keys: Mutex<HashMap<String, HashSet<String>>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statement_count(&self) -> usize {
        self.statements.lock().len()
    }

    pub fn push_query_result(&self, rows: Vec<Vec<Value>>) {
        self.query_results.lock().push(rows);
    }

    fn table_of(sql: &str) -> Option<String> {
        let rest = sql.strip_prefix("INSERT INTO \"")?;
        Some(rest.split('"').next()?.to_string())
    }

    fn column_count(sql: &str) -> usize {
        let Some(open) = sql.find('(') else { return 1 };
        let Some(close) = sql[open..].find(')') else {
            return 1;
        };
        sql[open..open + close].matches('"').count() / 2
    }

    fn check_insert(&self, stmt: &SqlStatement) -> Result<()> {
        let Some(table) = Self::table_of(&stmt.sql) else {
            return Ok(());
        };
        let on_conflict = stmt.sql.contains("ON CONFLICT");
        let columns = Self::column_count(&stmt.sql).max(1);

        let mut keys = self.inserted_keys.lock();
        let table_keys = keys.entry(table).or_default();
        for row in stmt.params.chunks(columns) {
            let Some(first) = row.first() else { continue };
            let key = format!("{first:?}");
            if !table_keys.insert(key.clone()) && !on_conflict {
                return Err(AppError::Database(sqlx::Error::Protocol(format!(
                    "duplicate key value violates unique constraint: {key}"
                ))));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DbExecutor for MemoryDb {
    async fn query(&self, stmt: SqlStatement) -> Result<Vec<Vec<Value>>> {
        self.statements.lock().push(stmt);
        let mut canned = self.query_results.lock();
        if canned.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(canned.remove(0))
        }
    }

    async fn execute(&self, stmt: SqlStatement) -> Result<u64> {
        self.statements.lock().push(stmt);
        Ok(1)
    }

    async fn execute_batch(&self, stmts: Vec<SqlStatement>) -> Result<()> {
        for stmt in &stmts {
            self.check_insert(stmt)?;
        }
        self.statements.lock().extend(stmts);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE BUILDERS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn log_filter_source(id: &str, start: u64, end: Option<u64>, max_range: u64) -> LogFilterSource {
    LogFilterSource {
        id: SourceId::new(id),
        chain_id: 1,
        address: None,
        topics: Default::default(),
        start_block: start,
        end_block: end,
        max_range: Some(max_range),
    }
}

pub fn factory_log_source(
    id: &str,
    factory_address: Address,
    selector: B256,
    start: u64,
    end: Option<u64>,
    max_range: u64,
) -> FactoryLogSource {
    FactoryLogSource {
        id: SourceId::new(id),
        chain_id: 1,
        factory: FactoryCriteria {
            address: factory_address,
            event_selector: selector,
            child_location: palisade_indexer::types::source::ChildLocation::Topic(1),
        },
        topics: Default::default(),
        start_block: start,
        end_block: end,
        max_range: Some(max_range),
    }
}

pub fn block_interval_source(
    id: &str,
    interval: u64,
    offset: u64,
    start: u64,
    end: Option<u64>,
) -> BlockIntervalSource {
    BlockIntervalSource {
        id: SourceId::new(id),
        chain_id: 1,
        interval,
        offset,
        start_block: start,
        end_block: end,
    }
}
