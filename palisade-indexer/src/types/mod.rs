//! Domain types shared across the sync and indexing engines.
//!
//! - [`interval`] - Interval algebra over inclusive block ranges
//! - [`source`] - Configured source descriptors
//! - [`chain`] - Fetched chain data (blocks, logs, traces)
//! - [`event`] - Decoded events consumed by the indexing store
//! - [`row`] - Row value model for user on-chain tables

pub mod chain;
pub mod event;
pub mod interval;
pub mod row;
pub mod source;

pub use chain::{CallTraceFrame, ChainBlock, ChainLog, ChainReceipt, ChainTransaction};
pub use event::{Event, EventBatch, EventKind};
pub use interval::{Interval, IntervalSet};
pub use row::{
    ColumnKind, ColumnSchema, Row, SchemaRegistry, TableId, TableSchema, Value, WriteKind,
    estimated_row_bytes, normalize_row,
};
pub use source::{
    BlockIntervalSource, CallTraceSource, ChainId, ChildLocation, FactoryCallTraceSource,
    FactoryCriteria, FactoryLogSource, LogFilterSource, Source, SourceId, Topics,
};
