//! Data persistence: the write-behind row cache, the user-facing
//! indexing store, and the PostgreSQL adapters.

pub mod indexing;
pub mod postgres;
pub mod row_cache;

pub use indexing::{IndexingStore, InsertBuilder, InsertOp, Patch, UpdateBuilder};
pub use postgres::{PostgresExecutor, PostgresSyncStore};
pub use row_cache::{EntryKind, RowCache};
