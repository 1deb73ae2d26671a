//! Port traits: the capabilities the core consumes.
//!
//! Infrastructure adapters implement these traits using concrete backends
//! (PostgreSQL via sqlx, HTTP JSON-RPC). Tests swap in in-memory
//! implementations.

pub mod db;
pub mod rpc;
pub mod sync_store;

pub use db::{DbExecutor, SqlStatement};
pub use rpc::{LogQuery, RpcClient, TraceQuery};
pub use sync_store::{RpcRequestResult, SyncStore, extract_child_address};
