//! Palisade Indexing Runtime Core
//!
//! The core of a blockchain indexing runtime: backfills historical
//! on-chain data from a JSON-RPC endpoint into a relational store, and
//! mediates user indexing callbacks' reads and writes through a
//! write-behind row cache with RPC response memoization.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                     HISTORICAL SYNC (per chain)                    │
//! │  ┌───────────┐   ┌───────────┐   ┌───────────┐   ┌─────────────┐  │
//! │  │ Interval  │──▶│  Task     │──▶│  Block    │──▶│  Monotone   │  │
//! │  │ trackers  │   │  queue    │   │ callbacks │   │ checkpoints │  │
//! │  └───────────┘   └───────────┘   └───────────┘   └─────────────┘  │
//! ├────────────────────────────────────────────────────────────────────┤
//! │                        INDEXING (per run)                          │
//! │  ┌───────────┐   ┌───────────┐   ┌───────────┐   ┌─────────────┐  │
//! │  │ Indexing  │──▶│   Row     │──▶│  Batched  │   │ Cached RPC  │  │
//! │  │  store    │   │  cache    │   │  flush    │   │ + prefetch  │  │
//! │  └───────────┘   └───────────┘   └───────────┘   └─────────────┘  │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`types`] - Domain types (intervals, sources, chain data, rows)
//! - [`error`] - Layered error types
//! - [`config`] - Configuration loading and validation
//! - [`metrics`] - Metric names and registration
//! - [`ports`] - Capabilities the core consumes (RPC, sync store, DB)
//! - [`sync`] - Historical sync scheduler
//! - [`store`] - Row cache, indexing store, PostgreSQL adapters
//! - [`rpc`] - Cached RPC transport and access-pattern profiler
//!
//! The CLI, config file loader, schema builder, HTTP/GraphQL server, and
//! realtime (reorg-tracking) sync live in sibling crates; this crate
//! reaches them only through the [`ports`].

pub mod config;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod rpc;
pub mod store;
pub mod sync;
pub mod types;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the library version string
#[must_use]
pub const fn version() -> &'static str {
    VERSION
}
