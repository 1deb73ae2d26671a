//! Metric names and registration.
//!
//! The crate emits through the `metrics` facade; the hosting binary
//! decides the exporter. Names and labels are part of the public contract
//! and must not change between releases.
//!
//! # Historical sync
//!
//! | Metric | Kind | Labels |
//! |---|---|---|
//! | `ponder_historical_total_blocks` | gauge | chain, source, type |
//! | `ponder_historical_cached_blocks` | gauge | chain, source, type |
//! | `ponder_historical_completed_blocks` | counter | chain, source, type |
//! | `ponder_historical_start_timestamp` | gauge | chain |
//!
//! # Indexing
//!
//! | Metric | Kind | Labels |
//! |---|---|---|
//! | `ponder_indexing_rpc_requests_total` | counter | chain, method, type |
//! | `ponder_indexing_rpc_action_duration` | histogram | action |
//! | `ponder_indexing_rpc_prefetch_total` | counter | chain, method, type |
//! | `ponder_indexing_store_queries_total` | counter | table, method |
//! | `ponder_indexing_store_raw_sql_duration` | histogram | - |

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Total blocks a source must sync, per `(chain, source, type)`.
pub const HISTORICAL_TOTAL_BLOCKS: &str = "ponder_historical_total_blocks";

/// Blocks already covered by persisted intervals at startup.
pub const HISTORICAL_CACHED_BLOCKS: &str = "ponder_historical_cached_blocks";

/// Blocks completed this run; increments per interval closure.
pub const HISTORICAL_COMPLETED_BLOCKS: &str = "ponder_historical_completed_blocks";

/// Unix timestamp at which historical sync started.
pub const HISTORICAL_START_TIMESTAMP: &str = "ponder_historical_start_timestamp";

/// RPC requests served, by source: `rpc`, `database`, `prefetch_rpc`,
/// `prefetch_database`.
pub const INDEXING_RPC_REQUESTS_TOTAL: &str = "ponder_indexing_rpc_requests_total";

/// Duration of user-visible RPC actions, seconds.
pub const INDEXING_RPC_ACTION_DURATION: &str = "ponder_indexing_rpc_action_duration";

/// Prefetch attempts, by target: `database` or `rpc`.
pub const INDEXING_RPC_PREFETCH_TOTAL: &str = "ponder_indexing_rpc_prefetch_total";

/// Indexing store operations, per `(table, method)`.
pub const INDEXING_STORE_QUERIES_TOTAL: &str = "ponder_indexing_store_queries_total";

/// Duration of user raw-SQL queries, seconds.
pub const INDEXING_STORE_RAW_SQL_DURATION: &str = "ponder_indexing_store_raw_sql_duration";

/// Describe all metrics to the installed recorder.
///
/// Call once at startup, after the exporter is installed. Describing is
/// idempotent; emitting without describing also works.
pub fn describe() {
    describe_gauge!(
        HISTORICAL_TOTAL_BLOCKS,
        "Total blocks required per chain and source"
    );
    describe_gauge!(
        HISTORICAL_CACHED_BLOCKS,
        "Blocks already persisted per chain and source at startup"
    );
    describe_counter!(
        HISTORICAL_COMPLETED_BLOCKS,
        "Blocks completed per chain and source this run"
    );
    describe_gauge!(
        HISTORICAL_START_TIMESTAMP,
        "Unix timestamp at historical sync start"
    );
    describe_counter!(
        INDEXING_RPC_REQUESTS_TOTAL,
        "RPC requests from user callbacks, by serving source"
    );
    describe_histogram!(
        INDEXING_RPC_ACTION_DURATION,
        "Duration of user-visible RPC actions in seconds"
    );
    describe_counter!(
        INDEXING_RPC_PREFETCH_TOTAL,
        "Prefetch attempts, by target cache layer"
    );
    describe_counter!(
        INDEXING_STORE_QUERIES_TOTAL,
        "Indexing store operations by table and method"
    );
    describe_histogram!(
        INDEXING_STORE_RAW_SQL_DURATION,
        "Duration of user raw SQL queries in seconds"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_is_safe_without_recorder() {
        // The facade no-ops when no recorder is installed.
        describe();
    }

    #[test]
    fn metric_names_are_stable() {
        assert_eq!(HISTORICAL_TOTAL_BLOCKS, "ponder_historical_total_blocks");
        assert_eq!(
            INDEXING_RPC_REQUESTS_TOTAL,
            "ponder_indexing_rpc_requests_total"
        );
    }
}
