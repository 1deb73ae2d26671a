//! Source descriptors: what on-chain data a chain must index.
//!
//! A source is immutable after configuration load. Each variant describes
//! one family of sync tasks the historical scheduler knows how to run:
//! plain log filters, factory-discovered log filters, call-trace filters,
//! factory call-trace filters, and periodic block filters.

use std::fmt;

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// Chain identifier (EIP-155).
pub type ChainId = u64;

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE ID
// ═══════════════════════════════════════════════════════════════════════════════

/// Stable identifier for a configured source.
///
/// Interval-persistence rows key on this id, so it must be stable across
/// runs for caching to take effect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(String);

impl SourceId {
    /// Create a source id from its configured name.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derived id under which a factory's child-discovery intervals are
    /// persisted. Child discovery is cached as a synthetic log filter over
    /// the factory address and event selector, separate from the factory
    /// log-filter intervals themselves.
    #[must_use]
    pub fn child_discovery(&self) -> Self {
        Self(format!("{}::children", self.0))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILTER PIECES
// ═══════════════════════════════════════════════════════════════════════════════

/// Topic filter positions for a log filter (topic0 through topic3).
///
/// `None` matches anything at that position; `Some(values)` matches any of
/// the listed values.
pub type Topics = [Option<Vec<B256>>; 4];

/// Where the child address lives inside a factory event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildLocation {
    /// Indexed parameter: topic1, topic2, or topic3.
    Topic(usize),
    /// Non-indexed parameter: 32-byte word offset into the event data.
    DataOffset(usize),
}

/// Identifies a factory contract and how to extract child addresses from
/// its creation events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryCriteria {
    /// The factory contract address.
    pub address: Address,
    /// Selector (topic0) of the child-creation event.
    pub event_selector: B256,
    /// Where the child address appears in the event.
    pub child_location: ChildLocation,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE VARIANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Log filter over fixed addresses and topics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilterSource {
    /// Stable id for interval persistence.
    pub id: SourceId,
    /// Chain this source indexes.
    pub chain_id: ChainId,
    /// Contract addresses to match; `None` matches every address.
    pub address: Option<Vec<Address>>,
    /// Topic filters.
    pub topics: Topics,
    /// First block to index.
    pub start_block: u64,
    /// Last block to index; `None` means "up to the finalized block".
    pub end_block: Option<u64>,
    /// Per-source override for the maximum `eth_getLogs` range.
    pub max_range: Option<u64>,
}

/// Log filter whose address set is discovered from a factory contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryLogSource {
    /// Stable id for interval persistence.
    pub id: SourceId,
    /// Chain this source indexes.
    pub chain_id: ChainId,
    /// The factory that creates child contracts.
    pub factory: FactoryCriteria,
    /// Topic filters applied to child logs.
    pub topics: Topics,
    /// First block to index.
    pub start_block: u64,
    /// Last block to index; `None` means "up to the finalized block".
    pub end_block: Option<u64>,
    /// Per-source override for the maximum `eth_getLogs` range.
    pub max_range: Option<u64>,
}

/// Call-trace filter over fixed from/to addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTraceSource {
    /// Stable id for interval persistence.
    pub id: SourceId,
    /// Chain this source indexes.
    pub chain_id: ChainId,
    /// Sender addresses to match; `None` matches every sender.
    pub from_address: Option<Vec<Address>>,
    /// Callee addresses to match; `None` matches every callee.
    pub to_address: Option<Vec<Address>>,
    /// First block to index.
    pub start_block: u64,
    /// Last block to index; `None` means "up to the finalized block".
    pub end_block: Option<u64>,
}

/// Call-trace filter whose callee set is discovered from a factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryCallTraceSource {
    /// Stable id for interval persistence.
    pub id: SourceId,
    /// Chain this source indexes.
    pub chain_id: ChainId,
    /// The factory that creates child contracts.
    pub factory: FactoryCriteria,
    /// Sender addresses to match; `None` matches every sender.
    pub from_address: Option<Vec<Address>>,
    /// First block to index.
    pub start_block: u64,
    /// Last block to index; `None` means "up to the finalized block".
    pub end_block: Option<u64>,
}

/// Periodic block source: every `interval`-th block from `offset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockIntervalSource {
    /// Stable id for interval persistence.
    pub id: SourceId,
    /// Chain this source indexes.
    pub chain_id: ChainId,
    /// Block period; must be non-zero.
    pub interval: u64,
    /// Phase offset: blocks `b` with `b % interval == offset % interval`.
    pub offset: u64,
    /// First block to index.
    pub start_block: u64,
    /// Last block to index; `None` means "up to the finalized block".
    pub end_block: Option<u64>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE
// ═══════════════════════════════════════════════════════════════════════════════

/// A configured source, one of the five filter families.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    /// Plain log filter.
    LogFilter(LogFilterSource),
    /// Factory-discovered log filter.
    FactoryLog(FactoryLogSource),
    /// Call-trace filter.
    CallTrace(CallTraceSource),
    /// Factory-discovered call-trace filter.
    FactoryCallTrace(FactoryCallTraceSource),
    /// Periodic block filter.
    BlockInterval(BlockIntervalSource),
}

impl Source {
    /// Stable id for interval persistence.
    #[must_use]
    pub fn id(&self) -> &SourceId {
        match self {
            Self::LogFilter(s) => &s.id,
            Self::FactoryLog(s) => &s.id,
            Self::CallTrace(s) => &s.id,
            Self::FactoryCallTrace(s) => &s.id,
            Self::BlockInterval(s) => &s.id,
        }
    }

    /// Chain this source indexes.
    #[must_use]
    pub const fn chain_id(&self) -> ChainId {
        match self {
            Self::LogFilter(s) => s.chain_id,
            Self::FactoryLog(s) => s.chain_id,
            Self::CallTrace(s) => s.chain_id,
            Self::FactoryCallTrace(s) => s.chain_id,
            Self::BlockInterval(s) => s.chain_id,
        }
    }

    /// First block to index.
    #[must_use]
    pub const fn start_block(&self) -> u64 {
        match self {
            Self::LogFilter(s) => s.start_block,
            Self::FactoryLog(s) => s.start_block,
            Self::CallTrace(s) => s.start_block,
            Self::FactoryCallTrace(s) => s.start_block,
            Self::BlockInterval(s) => s.start_block,
        }
    }

    /// Configured last block, if bounded.
    #[must_use]
    pub const fn end_block(&self) -> Option<u64> {
        match self {
            Self::LogFilter(s) => s.end_block,
            Self::FactoryLog(s) => s.end_block,
            Self::CallTrace(s) => s.end_block,
            Self::FactoryCallTrace(s) => s.end_block,
            Self::BlockInterval(s) => s.end_block,
        }
    }

    /// Metric label for this source family: `log`, `trace`, or `block`.
    #[must_use]
    pub const fn kind_label(&self) -> &'static str {
        match self {
            Self::LogFilter(_) | Self::FactoryLog(_) => "log",
            Self::CallTrace(_) | Self::FactoryCallTrace(_) => "trace",
            Self::BlockInterval(_) => "block",
        }
    }

    /// Whether this source uses trace-filter RPC requests.
    #[must_use]
    pub const fn is_trace(&self) -> bool {
        matches!(self, Self::CallTrace(_) | Self::FactoryCallTrace(_))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
