//! Domain representations of fetched chain data.
//!
//! The scheduler persists blocks, transactions, receipts, logs, and call
//! traces as opaque blobs alongside interval rows. These types carry only
//! the fields the sync store writes; the `RpcClient` adapter maps provider
//! responses into them.

use alloy::primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCK
// ═══════════════════════════════════════════════════════════════════════════════

/// A fetched block with full transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBlock {
    /// Block hash.
    pub hash: B256,
    /// Parent block hash.
    pub parent_hash: B256,
    /// Block number.
    pub number: u64,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Transactions included in the block.
    pub transactions: Vec<ChainTransaction>,
}

impl ChainBlock {
    /// Transactions whose hash appears in `hashes`, preserving block order.
    #[must_use]
    pub fn select_transactions(&self, hashes: &[B256]) -> Vec<ChainTransaction> {
        self.transactions
            .iter()
            .filter(|tx| hashes.contains(&tx.hash))
            .cloned()
            .collect()
    }
}

/// A transaction as included in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTransaction {
    /// Transaction hash.
    pub hash: B256,
    /// Position within the block.
    pub transaction_index: u64,
    /// Sender address.
    pub from: Address,
    /// Recipient address; `None` for contract creation.
    pub to: Option<Address>,
    /// Transferred value in wei.
    pub value: U256,
    /// Call data.
    pub input: Bytes,
}

/// A transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReceipt {
    /// Transaction hash.
    pub transaction_hash: B256,
    /// Block the transaction landed in.
    pub block_number: u64,
    /// Block hash.
    pub block_hash: B256,
    /// Whether the transaction succeeded.
    pub status: bool,
    /// Gas consumed.
    pub gas_used: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// An emitted log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLog {
    /// Emitting contract.
    pub address: Address,
    /// Topics, topic0 first. At most four.
    pub topics: Vec<B256>,
    /// Log data.
    pub data: Bytes,
    /// Block the log was emitted in.
    pub block_number: u64,
    /// Hash of that block.
    pub block_hash: B256,
    /// Position within the block.
    pub log_index: u64,
    /// Transaction that emitted the log.
    pub transaction_hash: B256,
}

impl ChainLog {
    /// Distinct transaction hashes of `logs`, first-seen order.
    #[must_use]
    pub fn distinct_transaction_hashes(logs: &[Self]) -> Vec<B256> {
        let mut seen = Vec::new();
        for log in logs {
            if !seen.contains(&log.transaction_hash) {
                seen.push(log.transaction_hash);
            }
        }
        seen
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CALL TRACE
// ═══════════════════════════════════════════════════════════════════════════════

/// A call frame from `trace_filter`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTraceFrame {
    /// Trace kind reported by the node (`call`, `create`, `suicide`, ...).
    pub kind: String,
    /// Position in the transaction's trace tree.
    pub trace_address: Vec<u64>,
    /// Caller.
    pub from: Address,
    /// Callee.
    pub to: Address,
    /// Call input data.
    pub input: Bytes,
    /// Call output data, if the node reported it.
    pub output: Option<Bytes>,
    /// Transferred value in wei.
    pub value: U256,
    /// Block the call executed in.
    pub block_number: u64,
    /// Hash of that block.
    pub block_hash: B256,
    /// Transaction containing the call.
    pub transaction_hash: B256,
}

impl CallTraceFrame {
    /// Whether this frame is a plain call (the only kind the scheduler
    /// persists).
    #[must_use]
    pub fn is_call(&self) -> bool {
        self.kind == "call"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
