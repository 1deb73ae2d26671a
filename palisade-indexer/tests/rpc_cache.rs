//! Cached RPC transport scenarios: multicall de-duplication, prefetch,
//! and response-cache hygiene.
#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use alloy::primitives::{Address, Bytes};
use serde_json::json;

use common::{MemorySyncStore, MockRpc, address_word};
use palisade_indexer::config::RpcSettings;
use palisade_indexer::rpc::{CachedRpcTransport, InnerCall, ReadContractParams};
use palisade_indexer::types::event::{Event, EventKind};

const TOKEN: Address = Address::repeat_byte(0x70);
const MULTICALL: Address = Address::repeat_byte(0x3C);
const ALICE: Address = Address::repeat_byte(0xA1);
const BOB: Address = Address::repeat_byte(0xB0);

fn transport(
    store: &Arc<MemorySyncStore>,
    rpc: &Arc<MockRpc>,
) -> CachedRpcTransport<MemorySyncStore, MockRpc> {
    CachedRpcTransport::new(
        1,
        "mainnet",
        Arc::clone(store),
        Arc::clone(rpc),
        RpcSettings::default(),
    )
}

fn transfer_event(block: u64, from: Address) -> Event {
    Event {
        kind: EventKind::Log,
        chain_id: 1,
        block_number: block,
        block_timestamp: block * 10,
        name: "Token:Transfer".into(),
        payload: json!({"args": {"from": format!("0x{}", hex::encode(from))}}),
    }
}

fn total_supply_calldata() -> Bytes {
    Bytes::from(vec![0x18, 0x16, 0x0d, 0xdd])
}

fn balance_of_calldata(holder: Address) -> Bytes {
    let mut data = vec![0x70, 0xa0, 0x82, 0x31];
    data.extend_from_slice(address_word(holder).as_slice());
    Bytes::from(data)
}

// ═══════════════════════════════════════════════════════════════════════════════
// MULTICALL DE-DUPLICATION (S7)
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn multicall_reuses_cached_inner_results() {
    let store = Arc::new(MemorySyncStore::new());
    let rpc = Arc::new(MockRpc::new());
    let transport = transport(&store, &rpc);

    let supply = Bytes::from(vec![0x01; 32]);
    let balance = Bytes::from(vec![0x02; 32]);
    rpc.seed_call(TOKEN, total_supply_calldata(), supply.clone());
    rpc.seed_call(TOKEN, balance_of_calldata(ALICE), balance.clone());

    let event = transfer_event(100, ALICE);

    // First multicall: one inner call, goes upstream.
    let first = transport
        .multicall(
            &event,
            MULTICALL,
            vec![InnerCall {
                target: TOKEN,
                calldata: total_supply_calldata(),
                allow_failure: false,
            }],
            None,
        )
        .await
        .unwrap();
    assert!(first[0].success);
    assert_eq!(first[0].data, supply);

    // Second multicall repeats the first call and adds a new one.
    let second = transport
        .multicall(
            &event,
            MULTICALL,
            vec![
                InnerCall {
                    target: TOKEN,
                    calldata: total_supply_calldata(),
                    allow_failure: false,
                },
                InnerCall {
                    target: TOKEN,
                    calldata: balance_of_calldata(ALICE),
                    allow_failure: false,
                },
            ],
            None,
        )
        .await
        .unwrap();

    // Order-preserving reassembly, with the cached first result reused.
    assert_eq!(second.len(), 2);
    assert!(second[0].success);
    assert_eq!(second[0].data, supply);
    assert!(second[1].success);
    assert_eq!(second[1].data, balance);

    // The upstream saw two aggregate3 batches of exactly one inner call
    // each: the second batch carried only the uncached balanceOf.
    assert_eq!(rpc.multicall_inner_counts(), vec![1, 1]);
}

#[tokio::test]
async fn empty_multicall_never_goes_upstream() {
    let store = Arc::new(MemorySyncStore::new());
    let rpc = Arc::new(MockRpc::new());
    let transport = transport(&store, &rpc);

    let event = transfer_event(100, ALICE);
    let results = transport
        .multicall(&event, MULTICALL, Vec::new(), None)
        .await
        .unwrap();

    assert!(results.is_empty());
    assert!(rpc.raw_requests.lock().is_empty());
}

#[tokio::test]
async fn failed_inner_results_are_not_persisted() {
    let store = Arc::new(MemorySyncStore::new());
    let rpc = Arc::new(MockRpc::new());
    let transport = transport(&store, &rpc);

    // Unseeded call: the mock reports success=false for it.
    let event = transfer_event(100, ALICE);
    let results = transport
        .multicall(
            &event,
            MULTICALL,
            vec![InnerCall {
                target: TOKEN,
                calldata: total_supply_calldata(),
                allow_failure: true,
            }],
            None,
        )
        .await
        .unwrap();

    assert!(!results[0].success);
    assert_eq!(store.rpc_result_count(), 0);

    // Still not cached: a repeat goes upstream again.
    transport
        .multicall(
            &event,
            MULTICALL,
            vec![InnerCall {
                target: TOKEN,
                calldata: total_supply_calldata(),
                allow_failure: true,
            }],
            None,
        )
        .await
        .unwrap();
    assert_eq!(rpc.multicall_inner_counts(), vec![1, 1]);
}

// ═══════════════════════════════════════════════════════════════════════════════
// SINGLE-CALL CACHING
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn read_contract_memoizes_per_block() {
    let store = Arc::new(MemorySyncStore::new());
    let rpc = Arc::new(MockRpc::new());
    let transport = transport(&store, &rpc);

    rpc.seed_call(TOKEN, total_supply_calldata(), Bytes::from(vec![0x01; 32]));
    let event = transfer_event(100, ALICE);

    for _ in 0..3 {
        let data = transport
            .read_contract(&event, ReadContractParams::new(TOKEN, total_supply_calldata()))
            .await
            .unwrap();
        assert_eq!(data, Bytes::from(vec![0x01; 32]));
    }

    // One upstream request; the rest were served from memory.
    let upstream_calls = rpc
        .raw_requests
        .lock()
        .iter()
        .filter(|(method, _)| method == "eth_call")
        .count();
    assert_eq!(upstream_calls, 1);
    // And the result was persisted for future runs.
    assert_eq!(store.rpc_result_count(), 1);
}

#[tokio::test]
async fn uncached_responses_are_never_persisted() {
    let store = Arc::new(MemorySyncStore::new());
    let rpc = Arc::new(MockRpc::new());
    let transport = transport(&store, &rpc);

    // Unseeded single call: the mock answers "0x".
    let value = transport
        .request(
            "eth_call",
            json!([
                {
                    "to": format!("0x{}", hex::encode(TOKEN)),
                    "data": format!("0x{}", hex::encode(total_supply_calldata())),
                },
                "0x64"
            ]),
        )
        .await
        .unwrap();

    assert_eq!(value, json!("0x"));
    assert_eq!(store.rpc_result_count(), 0);
}

#[tokio::test]
async fn non_cacheable_methods_pass_through() {
    let store = Arc::new(MemorySyncStore::new());
    let rpc = Arc::new(MockRpc::new());
    let transport = transport(&store, &rpc);

    let value = transport.request("eth_blockNumber", json!([])).await.unwrap();
    assert_eq!(value, json!("0x1000"));
    assert_eq!(store.rpc_result_count(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// PREFETCH
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn prefetch_warms_the_cache_for_the_next_batch() {
    let store = Arc::new(MemorySyncStore::new());
    let rpc = Arc::new(MockRpc::new());
    let transport = transport(&store, &rpc);

    rpc.seed_call(TOKEN, balance_of_calldata(ALICE), Bytes::from(vec![0x0A; 32]));
    rpc.seed_call(TOKEN, balance_of_calldata(BOB), Bytes::from(vec![0x0B; 32]));

    // Train: the callback reads balanceOf(event.from) on every event.
    let training = transfer_event(100, ALICE);
    for _ in 0..10 {
        transport
            .read_contract(
                &training,
                ReadContractParams::new(TOKEN, balance_of_calldata(ALICE)),
            )
            .await
            .unwrap();
    }
    // First batch folds the event into the profiler's counts.
    transport.prefetch(&[training]).await;

    // Next batch: a transfer from BOB predicts balanceOf(BOB) and fires
    // it upstream before any callback runs.
    let upcoming = transfer_event(200, BOB);
    transport.prefetch(std::slice::from_ref(&upcoming)).await;

    let bob_hex = format!("0x{}", hex::encode(balance_of_calldata(BOB)));
    let upstream_bob_calls = || {
        rpc.raw_requests
            .lock()
            .iter()
            .filter(|(method, params)| {
                method == "eth_call"
                    && params
                        .get(0)
                        .and_then(|call| call.get("data"))
                        .and_then(|d| d.as_str())
                        == Some(bob_hex.as_str())
            })
            .count()
    };

    // The consuming read is served from the prefetch slot: the upstream
    // was hit exactly once, by the prefetcher.
    let data = transport
        .read_contract(&upcoming, ReadContractParams::new(TOKEN, balance_of_calldata(BOB)))
        .await
        .unwrap();
    assert_eq!(data, Bytes::from(vec![0x0B; 32]));
    assert_eq!(upstream_bob_calls(), 1);

    // The prefetched result was also persisted to the request cache.
    assert!(store.rpc_result_count() >= 1);
}
