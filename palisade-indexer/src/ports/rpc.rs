//! RPC client port.
//!
//! The upstream JSON-RPC endpoint is reached only through this trait. The
//! scheduler uses the typed methods; the cached transport additionally
//! passes raw request bodies through [`RpcClient::request`]. Concrete
//! transports (HTTP, WebSocket, load-balanced pools) live outside this
//! crate.

use alloy::primitives::B256;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::RpcResult;
use crate::types::chain::{CallTraceFrame, ChainBlock, ChainLog, ChainReceipt};
use crate::types::source::Topics;

// ═══════════════════════════════════════════════════════════════════════════════
// QUERIES
// ═══════════════════════════════════════════════════════════════════════════════

/// An `eth_getLogs` query over an inclusive block range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    /// Addresses to match; `None` matches every address.
    pub addresses: Option<Vec<alloy::primitives::Address>>,
    /// Topic filters.
    pub topics: Topics,
    /// First block (inclusive).
    pub from_block: u64,
    /// Last block (inclusive).
    pub to_block: u64,
}

/// A `trace_filter` query over an inclusive block range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceQuery {
    /// Sender addresses to match; `None` matches every sender.
    pub from_addresses: Option<Vec<alloy::primitives::Address>>,
    /// Callee addresses to match; `None` matches every callee.
    pub to_addresses: Option<Vec<alloy::primitives::Address>>,
    /// First block (inclusive).
    pub from_block: u64,
    /// Last block (inclusive).
    pub to_block: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RPC CLIENT PORT
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for the chain's JSON-RPC endpoint.
///
/// Implementations own their transport-level timeouts; callers own retry
/// policy. Errors must be classified per [`crate::error::RpcError`] so the
/// scheduler can distinguish range-splitting from backoff from
/// propagation.
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Fetch logs matching a filter (`eth_getLogs`).
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RpcError::RangeTooLarge`] (or
    /// `ResponseTooLarge` / `Timeout`) when the node rejects the range;
    /// the caller splits and retries.
    async fn get_logs(&self, query: &LogQuery) -> RpcResult<Vec<ChainLog>>;

    /// Fetch a block with full transactions (`eth_getBlockByNumber`).
    ///
    /// Returns `None` when the node does not (yet) know the block.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a malformed response.
    async fn get_block_by_number(&self, number: u64) -> RpcResult<Option<ChainBlock>>;

    /// Fetch a transaction receipt (`eth_getTransactionReceipt`).
    ///
    /// Returns `None` when the node does not know the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a malformed response.
    async fn get_transaction_receipt(&self, hash: B256) -> RpcResult<Option<ChainReceipt>>;

    /// Fetch call traces matching a filter (`trace_filter`).
    ///
    /// # Errors
    ///
    /// Same range classification as [`Self::get_logs`].
    async fn trace_filter(&self, query: &TraceQuery) -> RpcResult<Vec<CallTraceFrame>>;

    /// Issue a raw JSON-RPC request.
    ///
    /// Used by the cached transport for user-callback reads (`eth_call`,
    /// balance/code/storage/proof reads, debug traces) that are keyed and
    /// memoized as opaque bodies.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a node-reported error.
    async fn request(&self, method: &str, params: &JsonValue) -> RpcResult<JsonValue>;
}
