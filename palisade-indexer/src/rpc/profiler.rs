//! Access-pattern profiler for RPC prefetching.
//!
//! User callbacks tend to issue the same contract reads for every event of
//! a given name, with arguments copied straight out of the event payload.
//! The profiler samples those reads, records how each argument word was
//! derived (a constant, or a payload field path), and later reconstructs
//! the likely reads for an upcoming event batch so the transport can warm
//! its caches before the callbacks run.
//!
//! Profiling works at the calldata-word level: a call is
//! `selector ++ n×32-byte words`. Calls with dynamic argument layouts do
//! not fit that shape and are simply not profiled.

use std::collections::{HashMap, VecDeque};

use alloy::primitives::{Address, B256, Bytes, U256};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::trace;

use crate::types::event::Event;

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Every N-th action invocation per event name is profiled.
pub const SAMPLING_RATE: u64 = 10;

/// Per-event cap on patterns that contain constants.
pub const MAX_CONSTANT_PATTERN_COUNT: usize = 10;

/// Expected-use threshold above which the database cache is consulted.
pub const DB_PREDICTION_THRESHOLD: f64 = 0.2;

/// Expected-use threshold above which a database miss goes to the RPC.
pub const RPC_PREDICTION_THRESHOLD: f64 = 0.8;

/// Maximum payload field-path length considered for derivation.
pub const MAX_DERIVATION_DEPTH: usize = 3;

// ═══════════════════════════════════════════════════════════════════════════════
// PATTERNS
// ═══════════════════════════════════════════════════════════════════════════════

/// How one calldata word (or the target address) was derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PatternValue {
    /// Same literal word on every invocation.
    Constant(String),
    /// Copied from the event payload at this field path.
    Derived(Vec<String>),
}

impl PatternValue {
    const fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }
}

/// A recorded call shape for one event name.
///
/// The serialized form (stable field order) is the pattern's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfilePattern {
    /// Event name the call was observed under.
    pub event_name: String,
    /// 4-byte function selector, `0x`-hex.
    pub selector: String,
    /// Target address derivation.
    pub address: PatternValue,
    /// One derivation per 32-byte argument word.
    pub args: Vec<PatternValue>,
}

impl ProfilePattern {
    fn key(&self) -> String {
        // Serialization of a struct with fixed field order is
        // deterministic.
        serde_json::to_string(self).unwrap_or_default()
    }

    fn has_constant(&self) -> bool {
        self.address.is_constant() || self.args.iter().any(PatternValue::is_constant)
    }
}

#[derive(Debug)]
struct PatternEntry {
    pattern: ProfilePattern,
    count: u64,
}

/// A reconstructed call the next batch is likely to issue.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictedCall {
    /// Target contract.
    pub address: Address,
    /// Full calldata (selector plus argument words).
    pub calldata: Bytes,
    /// Block the prediction is pinned to.
    pub block_number: u64,
    /// Expected number of uses in the batch (compared against the
    /// prediction thresholds, scaled by the sampling rate).
    pub expected: f64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROFILER
// ═══════════════════════════════════════════════════════════════════════════════

/// Online profiler of per-event RPC access patterns.
///
/// Owned by the cached RPC transport; its lifecycle is the indexing run.
#[derive(Debug, Default)]
pub struct AccessProfiler {
    /// Patterns per event name, keyed by deterministic serialization.
    patterns: HashMap<String, HashMap<String, PatternEntry>>,
    /// LRU of constant-bearing pattern keys per event name.
    constant_lru: HashMap<String, VecDeque<String>>,
    /// Action invocations per event name (drives sampling).
    invocations: HashMap<String, u64>,
    /// Events of each name seen so far (drives the expectation estimate).
    event_counts: HashMap<String, u64>,
}

impl AccessProfiler {
    /// Create an empty profiler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe one contract read issued while handling `event`.
    ///
    /// Only every [`SAMPLING_RATE`]-th invocation per event name is
    /// actually recorded.
    pub fn observe_call(&mut self, event: &Event, address: Address, calldata: &Bytes) {
        let invocations = self.invocations.entry(event.name.clone()).or_insert(0);
        *invocations += 1;
        if *invocations % SAMPLING_RATE != 0 {
            return;
        }
        self.record_pattern(event, address, calldata);
    }

    fn record_pattern(&mut self, event: &Event, address: Address, calldata: &Bytes) {
        // selector ++ n×32-byte words, or not profilable.
        if calldata.len() < 4 || (calldata.len() - 4) % 32 != 0 {
            return;
        }

        let leaves = enumerate_leaves(&event.payload, MAX_DERIVATION_DEPTH);
        let derive = |word: B256| -> PatternValue {
            leaves
                .iter()
                .find(|(_, leaf_word)| *leaf_word == word)
                .map_or_else(
                    || PatternValue::Constant(format!("0x{}", hex::encode(word))),
                    |(path, _)| PatternValue::Derived(path.clone()),
                )
        };

        let address_value = derive(address_word(address));
        let args: Vec<PatternValue> = calldata[4..]
            .chunks_exact(32)
            .map(|chunk| derive(B256::from_slice(chunk)))
            .collect();

        let pattern = ProfilePattern {
            event_name: event.name.clone(),
            selector: format!("0x{}", hex::encode(&calldata[..4])),
            address: address_value,
            args,
        };
        let key = pattern.key();
        let has_constant = pattern.has_constant();

        let entries = self.patterns.entry(event.name.clone()).or_default();
        entries
            .entry(key.clone())
            .or_insert_with(|| PatternEntry { pattern, count: 0 })
            .count += 1;
        trace!(event = %event.name, patterns = entries.len(), "Recorded profile pattern");

        if has_constant {
            let lru = self.constant_lru.entry(event.name.clone()).or_default();
            lru.retain(|k| *k != key);
            lru.push_back(key);
            while lru.len() > MAX_CONSTANT_PATTERN_COUNT {
                let Some(evicted) = lru.pop_front() else {
                    break;
                };
                if let Some(entries) = self.patterns.get_mut(&event.name) {
                    entries.remove(&evicted);
                }
            }
        }
    }

    /// Predict the reads the given batch is likely to issue, deduplicated
    /// by `(address, calldata, block)`. Also folds the batch into the
    /// per-event counts used by future predictions.
    ///
    /// Only predictions whose expectation clears
    /// [`DB_PREDICTION_THRESHOLD`] are returned; the caller applies
    /// [`RPC_PREDICTION_THRESHOLD`] for upstream fetches.
    pub fn predict(&mut self, events: &[Event]) -> Vec<PredictedCall> {
        let mut out: Vec<PredictedCall> = Vec::new();
        let mut seen: HashMap<(Address, Bytes, u64), usize> = HashMap::new();

        for event in events {
            let observed_events = self.event_counts.get(&event.name).copied().unwrap_or(0);
            if observed_events == 0 {
                continue;
            }
            let Some(entries) = self.patterns.get(&event.name) else {
                continue;
            };

            for entry in entries.values() {
                #[allow(clippy::cast_precision_loss)]
                let expected =
                    (entry.count * SAMPLING_RATE) as f64 / observed_events as f64;
                if expected <= DB_PREDICTION_THRESHOLD {
                    continue;
                }
                let Some((address, calldata)) = recover_call(&entry.pattern, &event.payload)
                else {
                    continue;
                };

                let dedup_key = (address, calldata.clone(), event.block_number);
                match seen.get(&dedup_key) {
                    Some(&index) => {
                        if expected > out[index].expected {
                            out[index].expected = expected;
                        }
                    }
                    None => {
                        seen.insert(dedup_key, out.len());
                        out.push(PredictedCall {
                            address,
                            calldata,
                            block_number: event.block_number,
                            expected,
                        });
                    }
                }
            }
        }

        for event in events {
            *self.event_counts.entry(event.name.clone()).or_insert(0) += 1;
        }

        out
    }

    /// Number of recorded patterns for an event name.
    #[must_use]
    pub fn pattern_count(&self, event_name: &str) -> usize {
        self.patterns.get(event_name).map_or(0, HashMap::len)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WORD ENCODING
// ═══════════════════════════════════════════════════════════════════════════════

fn address_word(address: Address) -> B256 {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_slice());
    B256::from(word)
}

/// Encode a payload leaf to the 32-byte word it would occupy in calldata.
fn leaf_word(leaf: &JsonValue) -> Option<B256> {
    match leaf {
        JsonValue::Number(n) => {
            let value = n.as_u64()?;
            Some(B256::from(U256::from(value)))
        }
        JsonValue::String(s) => {
            if let Some(stripped) = s.strip_prefix("0x") {
                let bytes = hex::decode(stripped).ok()?;
                if bytes.len() > 32 {
                    return None;
                }
                let mut word = [0u8; 32];
                word[32 - bytes.len()..].copy_from_slice(&bytes);
                Some(B256::from(word))
            } else {
                let value: U256 = s.parse().ok()?;
                Some(B256::from(value))
            }
        }
        _ => None,
    }
}

/// All `(path, word)` pairs for string/number leaves reachable within
/// `depth` field hops.
fn enumerate_leaves(payload: &JsonValue, depth: usize) -> Vec<(Vec<String>, B256)> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    walk(payload, depth, &mut path, &mut out);
    out
}

fn walk(
    value: &JsonValue,
    depth: usize,
    path: &mut Vec<String>,
    out: &mut Vec<(Vec<String>, B256)>,
) {
    if let Some(word) = leaf_word(value) {
        out.push((path.clone(), word));
        return;
    }
    if depth == 0 {
        return;
    }
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map {
                path.push(key.clone());
                walk(child, depth - 1, path, out);
                path.pop();
            }
        }
        JsonValue::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                path.push(index.to_string());
                walk(child, depth - 1, path, out);
                path.pop();
            }
        }
        _ => {}
    }
}

fn value_at_path<'a>(payload: &'a JsonValue, path: &[String]) -> Option<&'a JsonValue> {
    let mut current = payload;
    for segment in path {
        current = match current {
            JsonValue::Object(map) => map.get(segment)?,
            JsonValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn resolve_word(value: &PatternValue, payload: &JsonValue) -> Option<B256> {
    match value {
        PatternValue::Constant(hex_word) => {
            let bytes = hex::decode(hex_word.strip_prefix("0x")?).ok()?;
            (bytes.len() == 32).then(|| B256::from_slice(&bytes))
        }
        PatternValue::Derived(path) => leaf_word(value_at_path(payload, path)?),
    }
}

/// Rebuild `(address, calldata)` for a pattern against a new payload.
fn recover_call(pattern: &ProfilePattern, payload: &JsonValue) -> Option<(Address, Bytes)> {
    let address_word = resolve_word(&pattern.address, payload)?;
    if address_word[..12].iter().any(|b| *b != 0) {
        return None;
    }
    let address = Address::from_slice(&address_word[12..]);

    let selector = hex::decode(pattern.selector.strip_prefix("0x")?).ok()?;
    if selector.len() != 4 {
        return None;
    }

    let mut calldata = selector;
    for arg in &pattern.args {
        let word = resolve_word(arg, payload)?;
        calldata.extend_from_slice(word.as_slice());
    }
    Some((address, Bytes::from(calldata)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
