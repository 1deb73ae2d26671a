//! Cached RPC transport for user-callback chain reads.
//!
//! Every chain request issued from a user callback flows through
//! [`CachedRpcTransport::request`]:
//!
//! 1. `eth_call`s whose calldata starts with the `aggregate3` selector are
//!    split into their inner calls; each inner call is cached
//!    independently, only the misses are re-packed into one upstream
//!    multicall, and the outer response is reassembled in the original
//!    order.
//! 2. Cacheable methods are keyed by a canonical (order-stable,
//!    lowercased) JSON body and looked up in the in-memory cache, then
//!    the database cache, then the upstream RPC.
//! 3. Everything else passes through unchanged.
//!
//! Responses in `UNCACHED_RESPONSES` (`"0x"`, `null`) are never
//! persisted. The prefetcher slots in-flight upstream fetches next to the
//! in-memory cache; a resolving fetch is visible to every concurrent
//! lookup on the same key, and its error is surfaced only if the slot is
//! consumed.

use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::{Address, Bytes};
use alloy::sol;
use alloy::sol_types::{SolCall, SolValue};
use dashmap::DashMap;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use metrics::{counter, histogram};
use moka::sync::Cache as MokaCache;
use parking_lot::Mutex;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, warn};

use crate::config::RpcSettings;
use crate::error::{Result, RpcError};
use crate::metrics as metric_names;
use crate::ports::rpc::RpcClient;
use crate::ports::sync_store::{RpcRequestResult, SyncStore};
use crate::rpc::profiler::{AccessProfiler, RPC_PREDICTION_THRESHOLD};
use crate::types::event::Event;
use crate::types::source::ChainId;

sol! {
    /// One call of an `aggregate3` multicall.
    #[derive(Debug)]
    struct Call3 {
        address target;
        bool allowFailure;
        bytes callData;
    }

    /// One result of an `aggregate3` multicall.
    #[derive(Debug)]
    struct Result3 {
        bool success;
        bytes returnData;
    }

    function aggregate3(Call3[] calldata calls) external payable returns (Result3[] memory returnData);
}

/// Responses that are never persisted to the request-result cache.
pub const UNCACHED_RESPONSES: [&str; 2] = ["0x", "null"];

fn is_uncached(raw: &str) -> bool {
    UNCACHED_RESPONSES.contains(&raw)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PREFETCH SLOTS
// ═══════════════════════════════════════════════════════════════════════════════

type SharedFetch = Shared<BoxFuture<'static, std::result::Result<String, Arc<RpcError>>>>;

#[derive(Clone)]
enum PrefetchSlot {
    Resolved { value: String, from_database: bool },
    InFlight(SharedFetch),
}

// ═══════════════════════════════════════════════════════════════════════════════
// ACTION PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Block pinning policy for contract reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Pin to the current event's block (or an explicit block number).
    #[default]
    BlockPinned,
    /// The result never changes; read at `latest`.
    Immutable,
}

/// Parameters for [`CachedRpcTransport::read_contract`].
#[derive(Debug, Clone)]
pub struct ReadContractParams {
    /// Target contract.
    pub address: Address,
    /// Encoded call.
    pub calldata: Bytes,
    /// Explicit block override.
    pub block_number: Option<u64>,
    /// Block pinning policy.
    pub cache: CachePolicy,
    /// Whether `"returned no data"` responses are retried.
    pub retry_empty_response: bool,
}

impl ReadContractParams {
    /// A read pinned to the current event's block with default retry
    /// behavior.
    #[must_use]
    pub fn new(address: Address, calldata: Bytes) -> Self {
        Self {
            address,
            calldata,
            block_number: None,
            cache: CachePolicy::default(),
            retry_empty_response: true,
        }
    }
}

/// One inner call of a user multicall.
#[derive(Debug, Clone)]
pub struct InnerCall {
    /// Target contract.
    pub target: Address,
    /// Encoded call.
    pub calldata: Bytes,
    /// Whether the aggregate tolerates this call reverting.
    pub allow_failure: bool,
}

/// One inner result of a user multicall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerResult {
    /// Whether the inner call succeeded.
    pub success: bool,
    /// Returned data.
    pub data: Bytes,
}

// ═══════════════════════════════════════════════════════════════════════════════
// CACHED RPC TRANSPORT
// ═══════════════════════════════════════════════════════════════════════════════

/// RPC transport with response memoization and profiled prefetch.
pub struct CachedRpcTransport<S, R> {
    chain_id: ChainId,
    chain: String,
    sync_store: Arc<S>,
    rpc: Arc<R>,
    memory: MokaCache<String, String>,
    slots: DashMap<String, PrefetchSlot>,
    profiler: Mutex<AccessProfiler>,
    settings: RpcSettings,
}

impl<S, R> std::fmt::Debug for CachedRpcTransport<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedRpcTransport")
            .field("chain_id", &self.chain_id)
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

impl<S, R> CachedRpcTransport<S, R>
where
    S: SyncStore + 'static,
    R: RpcClient + 'static,
{
    /// Create a transport for one chain.
    pub fn new(
        chain_id: ChainId,
        chain: impl Into<String>,
        sync_store: Arc<S>,
        rpc: Arc<R>,
        settings: RpcSettings,
    ) -> Self {
        let memory = MokaCache::builder()
            .max_capacity(settings.memory_cache_max_entries)
            .build();
        Self {
            chain_id,
            chain: chain.into(),
            sync_store,
            rpc,
            memory,
            slots: DashMap::new(),
            profiler: Mutex::new(AccessProfiler::new()),
            settings,
        }
    }

    fn cache_key(&self, body: &str) -> String {
        format!("{}:{}", self.chain_id, body)
    }

    fn count_request(&self, method: &str, type_label: &'static str) {
        counter!(
            metric_names::INDEXING_RPC_REQUESTS_TOTAL,
            "chain" => self.chain.clone(),
            "method" => method.to_string(),
            "type" => type_label
        )
        .increment(1);
    }

    fn count_prefetch(&self, method: &str, type_label: &'static str) {
        counter!(
            metric_names::INDEXING_RPC_PREFETCH_TOTAL,
            "chain" => self.chain.clone(),
            "method" => method.to_string(),
            "type" => type_label
        )
        .increment(1);
    }

    // ───────────────────────────────────────────────────────────────────────────
    // REQUEST INTERCEPTION
    // ───────────────────────────────────────────────────────────────────────────

    /// Issue a chain request with caching.
    ///
    /// # Errors
    ///
    /// Returns the upstream [`RpcError`] or a database error from the
    /// request-result cache.
    pub async fn request(&self, method: &str, params: JsonValue) -> Result<JsonValue> {
        if method == "eth_call"
            && let Some((to, data)) = parse_eth_call(&params)
            && data.starts_with(&aggregate3Call::SELECTOR)
        {
            let block_tag = params.get(1).cloned().unwrap_or_else(|| json!("latest"));
            return self.multicall_request(to, &data, &block_tag).await;
        }

        let Some(block_position) = cacheable_block_position(method) else {
            self.count_request(method, "rpc");
            let value = self.rpc.request(method, &params).await?;
            return Ok(value);
        };

        let body = canonical_body(method, &params);
        let block_hint = block_position
            .and_then(|position| params.get(position))
            .and_then(parse_quantity);
        let raw = self
            .lookup_or_fetch(method, &body, block_hint, &params)
            .await?;
        Ok(parse_result(&raw))
    }

    async fn lookup_or_fetch(
        &self,
        method: &str,
        body: &str,
        block_hint: Option<u64>,
        params: &JsonValue,
    ) -> Result<String> {
        let key = self.cache_key(body);

        // Prefetch slots: resolved values move to the memory cache; an
        // in-flight fetch is awaited (and stays visible to concurrent
        // lookups until it lands in memory).
        let slot = self.slots.get(&key).map(|entry| entry.value().clone());
        match slot {
            Some(PrefetchSlot::Resolved {
                value,
                from_database,
            }) => {
                self.count_request(
                    method,
                    if from_database {
                        "prefetch_database"
                    } else {
                        "prefetch_rpc"
                    },
                );
                self.memory.insert(key.clone(), value.clone());
                self.slots.remove(&key);
                return Ok(value);
            }
            Some(PrefetchSlot::InFlight(shared)) => match shared.await {
                Ok(value) => {
                    self.count_request(method, "prefetch_rpc");
                    self.memory.insert(key.clone(), value.clone());
                    self.slots.remove(&key);
                    return Ok(value);
                }
                Err(error) => {
                    self.slots.remove(&key);
                    return Err((*error).clone().into());
                }
            },
            None => {}
        }

        if let Some(value) = self.memory.get(&key) {
            self.count_request(method, "database");
            return Ok(value);
        }

        let lookup = vec![body.to_string()];
        let db_hits = self
            .sync_store
            .get_rpc_request_results(self.chain_id, &lookup)
            .await?;
        if let Some(Some(value)) = db_hits.first() {
            self.count_request(method, "database");
            self.memory.insert(key, value.clone());
            return Ok(value.clone());
        }

        let value = self.rpc.request(method, params).await?;
        let raw = raw_string(&value);
        self.count_request(method, "rpc");

        if !is_uncached(&raw) {
            self.sync_store
                .insert_rpc_request_results(
                    self.chain_id,
                    &[RpcRequestResult {
                        request: body.to_string(),
                        block_number: block_hint,
                        result: raw.clone(),
                    }],
                )
                .await?;
            self.memory.insert(key, raw.clone());
        }
        Ok(raw)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // MULTICALL SPLITTING
    // ───────────────────────────────────────────────────────────────────────────

    async fn multicall_request(
        &self,
        multicall_address: Address,
        data: &Bytes,
        block_tag: &JsonValue,
    ) -> Result<JsonValue> {
        let decoded = aggregate3Call::abi_decode(data)
            .map_err(|e| RpcError::Malformed(format!("aggregate3 calldata: {e}")))?;
        let calls = decoded.calls;

        if calls.is_empty() {
            let empty: Vec<Result3> = Vec::new();
            return Ok(JsonValue::String(format!(
                "0x{}",
                hex::encode(empty.abi_encode())
            )));
        }

        let block_hint = parse_quantity(block_tag);
        let bodies: Vec<String> = calls
            .iter()
            .map(|call| {
                canonical_body(
                    "eth_call",
                    &json!([inner_call_params(call.target, &call.callData), block_tag]),
                )
            })
            .collect();

        let mut resolved: Vec<Option<Bytes>> = vec![None; calls.len()];

        // In-memory layer, including prefetch slots.
        for (index, body) in bodies.iter().enumerate() {
            let key = self.cache_key(body);
            let slot = self.slots.get(&key).map(|entry| entry.value().clone());
            let hit = match slot {
                Some(PrefetchSlot::Resolved { value, from_database }) => {
                    self.count_request(
                        "eth_call",
                        if from_database {
                            "prefetch_database"
                        } else {
                            "prefetch_rpc"
                        },
                    );
                    self.memory.insert(key.clone(), value.clone());
                    self.slots.remove(&key);
                    Some(value)
                }
                Some(PrefetchSlot::InFlight(shared)) => match shared.await {
                    Ok(value) => {
                        self.count_request("eth_call", "prefetch_rpc");
                        self.memory.insert(key.clone(), value.clone());
                        self.slots.remove(&key);
                        Some(value)
                    }
                    // Prefetch errors are not authoritative for the batch;
                    // the call falls through to the upstream multicall.
                    Err(_) => {
                        self.slots.remove(&key);
                        None
                    }
                },
                None => {
                    let value = self.memory.get(&key);
                    if value.is_some() {
                        self.count_request("eth_call", "database");
                    }
                    value
                }
            };
            if let Some(raw) = hit {
                resolved[index] = Some(parse_hex_bytes(&raw)?);
            }
        }

        // Database layer for what memory did not cover.
        let db_lookup: Vec<usize> = (0..calls.len()).filter(|&i| resolved[i].is_none()).collect();
        if !db_lookup.is_empty() {
            let lookup_bodies: Vec<String> =
                db_lookup.iter().map(|&i| bodies[i].clone()).collect();
            let results = self
                .sync_store
                .get_rpc_request_results(self.chain_id, &lookup_bodies)
                .await?;
            for (&index, result) in db_lookup.iter().zip(results) {
                if let Some(raw) = result {
                    self.count_request("eth_call", "database");
                    self.memory.insert(self.cache_key(&bodies[index]), raw.clone());
                    resolved[index] = Some(parse_hex_bytes(&raw)?);
                }
            }
        }

        // Misses re-pack into one upstream multicall at the same block.
        let misses: Vec<usize> = (0..calls.len()).filter(|&i| resolved[i].is_none()).collect();
        let mut fresh: Vec<Result3> = Vec::new();
        if !misses.is_empty() {
            let pending: Vec<Call3> = misses
                .iter()
                .map(|&i| Call3 {
                    target: calls[i].target,
                    allowFailure: calls[i].allowFailure,
                    callData: calls[i].callData.clone(),
                })
                .collect();
            let upstream_data = aggregate3Call { calls: pending }.abi_encode();
            let response = self
                .rpc
                .request(
                    "eth_call",
                    &json!([
                        inner_call_params(multicall_address, &Bytes::from(upstream_data)),
                        block_tag
                    ]),
                )
                .await?;
            self.count_request("eth_call", "rpc");

            let raw = raw_string(&response);
            let bytes = parse_hex_bytes(&raw)?;
            fresh = Vec::<Result3>::abi_decode(&bytes)
                .map_err(|e| RpcError::Malformed(format!("aggregate3 response: {e}")))?;
            if fresh.len() != misses.len() {
                return Err(RpcError::Malformed(format!(
                    "aggregate3 returned {} results for {} calls",
                    fresh.len(),
                    misses.len()
                ))
                .into());
            }

            // Persist successful, non-empty inner results. Failed inner
            // calls are returned to the caller but never cached.
            let mut to_persist = Vec::new();
            for (&index, result) in misses.iter().zip(&fresh) {
                let raw_inner = format!("0x{}", hex::encode(&result.returnData));
                if result.success && !is_uncached(&raw_inner) {
                    self.memory.insert(self.cache_key(&bodies[index]), raw_inner.clone());
                    to_persist.push(RpcRequestResult {
                        request: bodies[index].clone(),
                        block_number: block_hint,
                        result: raw_inner,
                    });
                }
            }
            if !to_persist.is_empty() {
                self.sync_store
                    .insert_rpc_request_results(self.chain_id, &to_persist)
                    .await?;
            }
        }

        // Reassemble the outer response in the original order.
        let mut fresh_iter = fresh.into_iter();
        let outer: Vec<Result3> = resolved
            .into_iter()
            .map(|cached| {
                cached.map_or_else(
                    || {
                        fresh_iter.next().unwrap_or(Result3 {
                            success: false,
                            returnData: Bytes::new(),
                        })
                    },
                    |data| Result3 {
                        success: true,
                        returnData: data,
                    },
                )
            })
            .collect();

        Ok(JsonValue::String(format!(
            "0x{}",
            hex::encode(outer.abi_encode())
        )))
    }

    // ───────────────────────────────────────────────────────────────────────────
    // USER ACTIONS
    // ───────────────────────────────────────────────────────────────────────────

    async fn with_retry<T, F, Fut>(&self, action: &'static str, retry_empty: bool, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut backoff = self.settings.retry_base_backoff();
        let mut attempt = 0;

        let result = loop {
            match f().await {
                Ok(value) => break Ok(value),
                Err(crate::error::AppError::Rpc(error))
                    if error.should_retry(retry_empty)
                        && attempt + 1 < self.settings.max_retry_attempts =>
                {
                    debug!(action, attempt, %error, "Retrying RPC action");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(error) => break Err(error),
            }
        };

        histogram!(metric_names::INDEXING_RPC_ACTION_DURATION, "action" => action)
            .record(started.elapsed().as_secs_f64());
        result
    }

    fn block_tag(event: &Event, explicit: Option<u64>, cache: CachePolicy) -> JsonValue {
        match (cache, explicit) {
            (CachePolicy::Immutable, _) => json!("latest"),
            (CachePolicy::BlockPinned, Some(number)) => json!(quantity(number)),
            (CachePolicy::BlockPinned, None) => json!(quantity(event.block_number)),
        }
    }

    /// `eth_call` a contract read, cached and retried.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::EmptyResponse`] when the call returns no data
    /// (after retries, unless opted out), or the upstream error.
    pub async fn read_contract(&self, event: &Event, params: ReadContractParams) -> Result<Bytes> {
        self.profiler
            .lock()
            .observe_call(event, params.address, &params.calldata);

        let tag = Self::block_tag(event, params.block_number, params.cache);
        let call_params = json!([inner_call_params(params.address, &params.calldata), tag]);

        self.with_retry("read_contract", params.retry_empty_response, || async {
            let value = self.request("eth_call", call_params.clone()).await?;
            let raw = raw_string(&value);
            if raw == "0x" || raw == "null" {
                return Err(RpcError::EmptyResponse(format!(
                    "eth_call to 0x{} returned no data",
                    hex::encode(params.address)
                ))
                .into());
            }
            Ok(parse_hex_bytes(&raw)?)
        })
        .await
    }

    /// Simulate a state-changing call (same cached `eth_call` path).
    ///
    /// # Errors
    ///
    /// Same as [`Self::read_contract`].
    pub async fn simulate_contract(
        &self,
        event: &Event,
        params: ReadContractParams,
    ) -> Result<Bytes> {
        self.profiler
            .lock()
            .observe_call(event, params.address, &params.calldata);

        let tag = Self::block_tag(event, params.block_number, params.cache);
        let call_params = json!([inner_call_params(params.address, &params.calldata), tag]);

        self.with_retry("simulate_contract", params.retry_empty_response, || async {
            let value = self.request("eth_call", call_params.clone()).await?;
            Ok(parse_hex_bytes(&raw_string(&value))?)
        })
        .await
    }

    /// Batch reads through `aggregate3`, deduplicated against the caches.
    ///
    /// # Errors
    ///
    /// Returns upstream and decoding errors.
    pub async fn multicall(
        &self,
        event: &Event,
        multicall_address: Address,
        calls: Vec<InnerCall>,
        block_number: Option<u64>,
    ) -> Result<Vec<InnerResult>> {
        {
            let mut profiler = self.profiler.lock();
            for call in &calls {
                profiler.observe_call(event, call.target, &call.calldata);
            }
        }

        let aggregate = aggregate3Call {
            calls: calls
                .iter()
                .map(|call| Call3 {
                    target: call.target,
                    allowFailure: call.allow_failure,
                    callData: call.calldata.clone(),
                })
                .collect(),
        };
        let data = Bytes::from(aggregate.abi_encode());
        let tag = Self::block_tag(event, block_number, CachePolicy::BlockPinned);
        let call_params = json!([inner_call_params(multicall_address, &data), tag]);

        self.with_retry("multicall", true, || async {
            let value = self.request("eth_call", call_params.clone()).await?;
            let bytes = parse_hex_bytes(&raw_string(&value))?;
            let results = Vec::<Result3>::abi_decode(&bytes)
                .map_err(|e| RpcError::Malformed(format!("aggregate3 response: {e}")))?;
            Ok(results
                .into_iter()
                .map(|r| InnerResult {
                    success: r.success,
                    data: r.returnData,
                })
                .collect())
        })
        .await
    }

    /// Fetch a block by explicit number, cached and retried.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::BlockNotFound`] while the node does not know
    /// the block (retried), or the upstream error.
    pub async fn get_block(&self, number: u64) -> Result<JsonValue> {
        let params = json!([quantity(number), true]);
        self.with_retry("get_block", true, || async {
            let value = self.request("eth_getBlockByNumber", params.clone()).await?;
            if value.is_null() {
                return Err(RpcError::BlockNotFound(number).into());
            }
            Ok(value)
        })
        .await
    }

    /// Fetch a transaction by hash, cached and retried.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::TransactionNotFound`] while the node does not
    /// know the transaction (retried), or the upstream error.
    pub async fn get_transaction(&self, hash: alloy::primitives::B256) -> Result<JsonValue> {
        let params = json!([format!("0x{}", hex::encode(hash))]);
        self.with_retry("get_transaction", true, || async {
            let value = self
                .request("eth_getTransactionByHash", params.clone())
                .await?;
            if value.is_null() {
                return Err(RpcError::TransactionNotFound(hash).into());
            }
            Ok(value)
        })
        .await
    }

    /// Fetch a transaction receipt by hash, cached and retried.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::ReceiptNotFound`] while the node does not know
    /// the receipt (retried), or the upstream error.
    pub async fn get_transaction_receipt(
        &self,
        hash: alloy::primitives::B256,
    ) -> Result<JsonValue> {
        let params = json!([format!("0x{}", hex::encode(hash))]);
        self.with_retry("get_transaction_receipt", true, || async {
            let value = self
                .request("eth_getTransactionReceipt", params.clone())
                .await?;
            if value.is_null() {
                return Err(RpcError::ReceiptNotFound(hash).into());
            }
            Ok(value)
        })
        .await
    }

    /// Confirmations of a transaction at the chain head.
    ///
    /// # Errors
    ///
    /// Returns receipt lookup errors and upstream errors.
    pub async fn get_transaction_confirmations(
        &self,
        hash: alloy::primitives::B256,
    ) -> Result<u64> {
        self.with_retry("get_transaction_confirmations", true, || async {
            let receipt = self.get_transaction_receipt(hash).await?;
            let mined = receipt
                .get("blockNumber")
                .and_then(parse_quantity)
                .ok_or_else(|| {
                    RpcError::Malformed("receipt without blockNumber".to_string())
                })?;
            // Head reads are never cacheable.
            let latest = self.rpc.request("eth_blockNumber", &json!([])).await?;
            let latest = parse_quantity(&latest)
                .ok_or_else(|| RpcError::Malformed("non-numeric eth_blockNumber".to_string()))?;
            Ok(latest.saturating_sub(mined) + 1)
        })
        .await
    }

    // ───────────────────────────────────────────────────────────────────────────
    // PREFETCH
    // ───────────────────────────────────────────────────────────────────────────

    /// Warm the caches for the next event batch.
    ///
    /// Best-effort: predicted reads above the database threshold are
    /// looked up in the request-result cache; misses above the RPC
    /// threshold are fired upstream now, with the in-flight future
    /// slotted into the cache. Errors are captured in the slot and
    /// surfaced only if the slot is consumed.
    pub async fn prefetch(&self, events: &[Event]) {
        let predictions = self.profiler.lock().predict(events);
        if predictions.is_empty() {
            return;
        }

        let candidates: Vec<_> = predictions
            .into_iter()
            .filter_map(|prediction| {
                let tag = json!(quantity(prediction.block_number));
                let body = canonical_body(
                    "eth_call",
                    &json!([
                        inner_call_params(prediction.address, &prediction.calldata),
                        tag
                    ]),
                );
                let key = self.cache_key(&body);
                if self.memory.contains_key(&key) || self.slots.contains_key(&key) {
                    return None;
                }
                Some((prediction, body, key))
            })
            .collect();
        if candidates.is_empty() {
            return;
        }

        let bodies: Vec<String> = candidates.iter().map(|(_, body, _)| body.clone()).collect();
        for _ in &bodies {
            self.count_prefetch("eth_call", "database");
        }
        let results = match self
            .sync_store
            .get_rpc_request_results(self.chain_id, &bodies)
            .await
        {
            Ok(results) => results,
            Err(error) => {
                warn!(chain = %self.chain, %error, "Prefetch database lookup failed");
                return;
            }
        };

        for ((prediction, body, key), result) in candidates.into_iter().zip(results) {
            match result {
                Some(value) => {
                    self.slots.insert(
                        key,
                        PrefetchSlot::Resolved {
                            value,
                            from_database: true,
                        },
                    );
                }
                None if prediction.expected > RPC_PREDICTION_THRESHOLD => {
                    self.count_prefetch("eth_call", "rpc");

                    let rpc = Arc::clone(&self.rpc);
                    let store = Arc::clone(&self.sync_store);
                    let chain_id = self.chain_id;
                    let params = json!([
                        inner_call_params(prediction.address, &prediction.calldata),
                        json!(quantity(prediction.block_number))
                    ]);
                    let block_number = prediction.block_number;

                    let fetch: SharedFetch = async move {
                        let value = rpc
                            .request("eth_call", &params)
                            .await
                            .map_err(Arc::new)?;
                        let raw = raw_string(&value);
                        if !is_uncached(&raw) {
                            let _ = store
                                .insert_rpc_request_results(
                                    chain_id,
                                    &[RpcRequestResult {
                                        request: body,
                                        block_number: Some(block_number),
                                        result: raw.clone(),
                                    }],
                                )
                                .await;
                        }
                        Ok(raw)
                    }
                    .boxed()
                    .shared();

                    // Drive the fetch eagerly; consumers clone the handle.
                    tokio::spawn(fetch.clone().map(|_| ()));
                    self.slots.insert(key, PrefetchSlot::InFlight(fetch));
                }
                None => {}
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CANONICAL BODIES AND PARSING
// ═══════════════════════════════════════════════════════════════════════════════

fn quantity(number: u64) -> String {
    format!("0x{number:x}")
}

fn inner_call_params(to: Address, data: &Bytes) -> JsonValue {
    json!({
        "data": format!("0x{}", hex::encode(data)),
        "to": format!("0x{}", hex::encode(to)),
    })
}

/// Canonical cache body: lowercased strings, object keys sorted (the
/// default `serde_json` map is ordered).
fn canonical_body(method: &str, params: &JsonValue) -> String {
    let canonical = json!({
        "method": method,
        "params": lowercase_strings(params),
    });
    canonical.to_string()
}

fn lowercase_strings(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(s.to_lowercase()),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(lowercase_strings).collect()),
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), lowercase_strings(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn raw_string(value: &JsonValue) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), ToString::to_string)
}

fn parse_result(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
}

fn parse_quantity(value: &JsonValue) -> Option<u64> {
    if let Some(s) = value.as_str() {
        let stripped = s.strip_prefix("0x")?;
        return u64::from_str_radix(stripped, 16).ok();
    }
    value.as_u64()
}

fn parse_eth_call(params: &JsonValue) -> Option<(Address, Bytes)> {
    let call = params.get(0)?;
    let to: Address = call.get("to")?.as_str()?.parse().ok()?;
    let data = call
        .get("data")
        .or_else(|| call.get("input"))?
        .as_str()?;
    let bytes = hex::decode(data.strip_prefix("0x")?).ok()?;
    Some((to, Bytes::from(bytes)))
}

fn parse_hex_bytes(raw: &str) -> std::result::Result<Bytes, RpcError> {
    let stripped = raw
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::Malformed(format!("expected hex data, got `{raw}`")))?;
    hex::decode(stripped)
        .map(Bytes::from)
        .map_err(|e| RpcError::Malformed(format!("invalid hex data: {e}")))
}

/// Cacheable methods, with the position of their block parameter when
/// block-dependent.
fn cacheable_block_position(method: &str) -> Option<Option<usize>> {
    match method {
        "eth_call" | "eth_getBalance" | "eth_getCode" => Some(Some(1)),
        "eth_getStorageAt" | "eth_getProof" => Some(Some(2)),
        "eth_getBlockByNumber" | "debug_traceBlockByNumber" => Some(Some(0)),
        "debug_traceCall" => Some(Some(1)),
        "eth_getTransactionByHash"
        | "eth_getTransactionReceipt"
        | "eth_getBlockByHash"
        | "debug_traceBlockByHash"
        | "debug_traceTransaction" => Some(None),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
