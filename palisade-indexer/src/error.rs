//! Layered error types for the Palisade indexing runtime.
//!
//! This module provides a hierarchical error system:
//!
//! - [`StoreError`] - Indexing-store errors surfaced to user callbacks
//! - [`RpcError`] - RPC transport errors with retry classification
//! - [`SyncError`] - Historical sync configuration and tracker errors
//! - [`AppError`] - Application-level errors combining all layers
//!
//! # Error Philosophy
//!
//! - Store errors are recoverable and surfaced to the failing callback,
//!   except [`StoreError::Flush`], which is fatal to the indexing run
//! - RPC errors carry their retry classification; the scheduler and the
//!   cached transport decide between range-splitting, backoff, and
//!   propagation based on it
//! - Sync errors reject invalid configuration at startup

use alloy::primitives::B256;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// STORE ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors surfaced by the indexing store to user callbacks.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Insert against a key that already exists.
    #[error("unique constraint violated in `{table}` for key `{key}`")]
    UniqueConstraint {
        /// Table written to.
        table: String,
        /// Canonical primary-key string.
        key: String,
    },

    /// Update or delete against an absent key.
    #[error("record not found in `{table}` for key `{key}`")]
    RecordNotFound {
        /// Table written to.
        table: String,
        /// Canonical primary-key string.
        key: String,
    },

    /// A non-nullable column resolved to NULL on insert.
    #[error("column `{table}`.`{column}` does not allow null values")]
    NotNull {
        /// Table written to.
        table: String,
        /// Offending column.
        column: String,
    },

    /// A bigint column received an incompatible value.
    #[error("bigint serialization failed for column `{column}`: {hint}")]
    BigIntSerialization {
        /// Offending column.
        column: String,
        /// What the caller should do instead.
        hint: String,
    },

    /// Enum or type-shape violation at normalization time.
    #[error("check constraint failed for column `{column}`: {message}")]
    CheckConstraint {
        /// Offending column.
        column: String,
        /// What failed.
        message: String,
    },

    /// A supplied column is not declared by the table schema.
    #[error("table `{table}` has no column `{column}`")]
    UndefinedColumn {
        /// Table written to.
        table: String,
        /// Unknown column.
        column: String,
    },

    /// Write against a table outside the on-chain schema.
    #[error("invalid store method: {0}")]
    InvalidStoreMethod(String),

    /// Operation against a table the schema does not declare.
    #[error("undefined table `{0}`")]
    UndefinedTable(String),

    /// Batched flush to the database failed. Fatal to the indexing run.
    #[error("flush failed: {0} (see https://palisade.dev/docs/indexing-store#flush)")]
    Flush(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// RPC ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors from the RPC transport, classified for retry decisions.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum RpcError {
    /// The requested block does not exist (yet) on the queried node.
    #[error("block {0} not found")]
    BlockNotFound(u64),

    /// The requested transaction is unknown to the queried node.
    #[error("transaction {0} not found")]
    TransactionNotFound(B256),

    /// The requested receipt is unknown to the queried node.
    #[error("transaction receipt {0} not found")]
    ReceiptNotFound(B256),

    /// The node rejected a log or trace query for covering too many
    /// blocks, or asked for a smaller range.
    #[error("block range too large: {0}")]
    RangeTooLarge(String),

    /// The response exceeded the node's size limit.
    #[error("response too large: {0}")]
    ResponseTooLarge(String),

    /// The request timed out.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The node returned no data for a call that should have some.
    #[error("call returned no data: {0}")]
    EmptyResponse(String),

    /// Transport-level failure (connection, HTTP status).
    #[error("transport error: {0}")]
    Transport(String),

    /// The response arrived but could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RpcError {
    /// Whether a log/trace range request should be split in half and
    /// retried piecewise.
    #[must_use]
    pub const fn should_split_range(&self) -> bool {
        matches!(
            self,
            Self::RangeTooLarge(_) | Self::ResponseTooLarge(_) | Self::Timeout(_)
        )
    }

    /// Whether a user-visible action should retry with backoff.
    ///
    /// `retry_empty_response` reflects the caller's opt-out for
    /// "returned no data" responses.
    #[must_use]
    pub const fn should_retry(&self, retry_empty_response: bool) -> bool {
        match self {
            Self::BlockNotFound(_) | Self::TransactionNotFound(_) | Self::ReceiptNotFound(_) => {
                true
            }
            Self::EmptyResponse(_) => retry_empty_response,
            _ => false,
        }
    }
}

/// Result alias for RPC operations.
pub type RpcResult<T> = std::result::Result<T, RpcError>;

// ═══════════════════════════════════════════════════════════════════════════════
// SYNC ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors from historical sync configuration and progress tracking.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// A source's block range is inconsistent with the chain head.
    #[error(
        "invalid range for source `{source_id}`: start {start}, end {end}, \
         latest {latest}, finalized {finalized}"
    )]
    InvalidSourceRange {
        /// Offending source id.
        source_id: String,
        /// Configured start block.
        start: u64,
        /// Effective end block.
        end: u64,
        /// Latest block at startup.
        latest: u64,
        /// Finalized block at startup.
        finalized: u64,
    },

    /// A tracker was constructed with completed work outside its target.
    #[error("completed intervals are not a subset of the target")]
    CompletedOutsideTarget,
}

// ═══════════════════════════════════════════════════════════════════════════════
// APPLICATION ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Application-level errors combining all layers.
///
/// This is the primary error type used throughout the crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppError {
    /// Indexing-store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// RPC transport error.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// Historical sync error.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file error.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Graceful shutdown requested.
    #[error("shutdown requested")]
    ShutdownRequested,
}

/// Type alias for application Results.
pub type Result<T> = std::result::Result<T, AppError>;

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
