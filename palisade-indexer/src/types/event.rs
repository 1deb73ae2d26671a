//! Decoded events consumed by the indexing store.
//!
//! Events arrive in ordered batches from the event decoder (external to
//! this crate). The indexing store dispatches each to its registered user
//! callback; the RPC prefetcher inspects upcoming batches to warm its
//! caches.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::source::ChainId;

/// What kind of occurrence produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A matched log.
    Log,
    /// A matched call trace.
    CallTrace,
    /// A periodic block.
    Block,
}

/// A decoded event, ready for user-callback dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Occurrence kind.
    pub kind: EventKind,
    /// Chain the event originated on.
    pub chain_id: ChainId,
    /// Block the event occurred in.
    pub block_number: u64,
    /// Timestamp of that block, Unix seconds.
    pub block_timestamp: u64,
    /// Registered event name, e.g. `"Pool:Swap"`.
    pub name: String,
    /// Decoded payload: named event arguments plus log/transaction context.
    pub payload: JsonValue,
}

/// An ordered batch of events, processed one callback at a time.
pub type EventBatch = Vec<Event>;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn event_holds_payload() {
        let event = Event {
            kind: EventKind::Log,
            chain_id: 1,
            block_number: 42,
            block_timestamp: 1_700_000_000,
            name: "Pool:Swap".into(),
            payload: json!({"args": {"sender": "0xab", "amount": "100"}}),
        };
        assert_eq!(event.payload["args"]["amount"], "100");
    }
}
