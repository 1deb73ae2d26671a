//! End-to-end indexing store scenarios over the in-memory executor.
#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use alloy::primitives::I256;

use common::MemoryDb;
use palisade_indexer::config::StoreSettings;
use palisade_indexer::error::{AppError, StoreError};
use palisade_indexer::store::{IndexingStore, Patch};
use palisade_indexer::types::row::{
    ColumnKind, ColumnSchema, Row, SchemaRegistry, TableSchema, Value,
};

fn pet_schema() -> SchemaRegistry {
    SchemaRegistry::new(vec![
        TableSchema::new(
            "Pet",
            vec![
                ColumnSchema::new("id", ColumnKind::Text).primary_key(),
                ColumnSchema::new("name", ColumnKind::Text),
                ColumnSchema::new("age", ColumnKind::Int).nullable(),
                ColumnSchema::new("bigAge", ColumnKind::BigInt).nullable(),
            ],
        ),
        TableSchema::new(
            "Account",
            vec![
                ColumnSchema::new("id", ColumnKind::Hex).primary_key(),
                ColumnSchema::new("n", ColumnKind::Int).nullable(),
            ],
        ),
    ])
}

fn store_with(settings: StoreSettings) -> (IndexingStore<MemoryDb>, Arc<MemoryDb>) {
    let db = Arc::new(MemoryDb::new());
    let store = IndexingStore::new(Arc::clone(&db), Arc::new(pet_schema()), settings, true);
    (store, db)
}

fn store() -> (IndexingStore<MemoryDb>, Arc<MemoryDb>) {
    store_with(StoreSettings::default())
}

fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn key(id: &str) -> Row {
    row(&[("id", Value::String(id.into()))])
}

fn big(n: i64) -> Value {
    Value::BigInt(I256::try_from(n).unwrap_or_default())
}

// ═══════════════════════════════════════════════════════════════════════════════
// BASIC CREATE / FIND / DELETE (S1)
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn create_find_delete_round_trip() {
    let (store, db) = store();

    store
        .insert("Pet")
        .values(row(&[
            ("id", Value::String("id1".into())),
            ("name", Value::String("Skip".into())),
            ("age", Value::Int(12)),
        ]))
        .execute()
        .await
        .unwrap();

    let found = store.find("Pet", &key("id1")).await.unwrap().unwrap();
    assert_eq!(found["name"], Value::String("Skip".into()));
    assert_eq!(found["age"], Value::Int(12));

    assert!(store.delete("Pet", &key("id1")).await.unwrap());
    assert_eq!(store.find("Pet", &key("id1")).await.unwrap(), None);

    // The row never reached the database: unflushed insert, then delete.
    assert_eq!(db.statement_count(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIMISTIC INSERT, FLUSH CONFLICT (S2)
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn optimistic_double_insert_fails_at_flush() {
    // A tiny byte budget forces each flush to evict everything, so the
    // second insert cannot see the first in the cache.
    let settings = StoreSettings {
        max_cache_bytes: 1,
        flush_ratio: 1.0,
        ..StoreSettings::default()
    };
    let (store, _db) = store_with(settings);

    let pet = row(&[
        ("id", Value::String("id1".into())),
        ("name", Value::String("Skip".into())),
    ]);

    // First event: insert and flush (entry evicted afterwards).
    store.insert("Pet").values(pet.clone()).execute().await.unwrap();
    store.flush().await.unwrap();
    assert_eq!(store.find("Pet", &key("id1")).await.unwrap(), None); // evicted, db mock returns nothing

    // Second event: the optimistic insert succeeds in cache...
    store.insert("Pet").values(pet).execute().await.unwrap();

    // ...and the conflict surfaces as a fatal flush error.
    let err = store.flush().await.unwrap_err();
    assert!(matches!(err, AppError::Store(StoreError::Flush(_))));
}

// ═══════════════════════════════════════════════════════════════════════════════
// UPDATE FUNCTION (S3)
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn derived_update_preserves_untouched_columns() {
    let (store, _db) = store();

    store
        .insert("Pet")
        .values(row(&[
            ("id", Value::String("id1".into())),
            ("name", Value::String("Skip".into())),
            ("bigAge", big(100)),
        ]))
        .execute()
        .await
        .unwrap();

    let updated = store
        .update("Pet", key("id1"))
        .set(Patch::derived(|current| {
            let Some(Value::String(name)) = current.get("name") else {
                return Row::new();
            };
            row(&[("name", Value::String(format!("{name} and Skipper")))])
        }))
        .await
        .unwrap();

    assert_eq!(updated["name"], Value::String("Skip and Skipper".into()));
    assert_eq!(updated["bigAge"], big(100));
}

// ═══════════════════════════════════════════════════════════════════════════════
// HEX ID CASE-INSENSITIVITY (S4)
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn hex_ids_are_case_insensitive() {
    let (store, _db) = store();

    store
        .insert("Account")
        .values(row(&[("id", Value::String("0x0a".into()))]))
        .execute()
        .await
        .unwrap();

    // Update addressed with different casing mutates the same row.
    store
        .update("Account", row(&[("id", Value::String("0x0A".into()))]))
        .set(row(&[("n", Value::Int(2))]))
        .await
        .unwrap();

    let found = store
        .find("Account", &row(&[("id", Value::String("0x0A".into()))]))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found["n"], Value::Int(2));
    assert_eq!(
        found["id"],
        Value::Hex(alloy::primitives::Bytes::from(vec![0x0a]))
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// READ-AFTER-WRITE AND CROSS-CALLBACK VISIBILITY
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn writes_are_visible_to_the_next_reader() {
    let (store, _db) = store();

    // Two "callbacks" sharing the store observe each other's writes in
    // dispatch order.
    let first = store.clone();
    first
        .insert("Pet")
        .values(row(&[
            ("id", Value::String("id1".into())),
            ("name", Value::String("Skip".into())),
        ]))
        .execute()
        .await
        .unwrap();

    let second = store.clone();
    let seen = second.find("Pet", &key("id1")).await.unwrap();
    assert!(seen.is_some());
}

#[tokio::test]
async fn raw_sql_sees_pending_writes() {
    let (store, db) = store();

    store
        .insert("Pet")
        .values(row(&[
            ("id", Value::String("id1".into())),
            ("name", Value::String("Skip".into())),
        ]))
        .execute()
        .await
        .unwrap();

    store.sql("SELECT \"id\" FROM \"Pet\"").await.unwrap();

    // The flush INSERT landed before the raw query ran.
    let statements = db.statements.lock();
    let insert = statements
        .iter()
        .position(|s| s.sql.starts_with("INSERT INTO \"Pet\""))
        .unwrap();
    let select = statements
        .iter()
        .position(|s| s.sql.starts_with("SELECT \"id\""))
        .unwrap();
    assert!(insert < select);
}

// ═══════════════════════════════════════════════════════════════════════════════
// DELETE SEMANTICS
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn delete_after_flush_hits_the_database() {
    let (store, db) = store();

    store
        .insert("Pet")
        .values(row(&[
            ("id", Value::String("id1".into())),
            ("name", Value::String("Skip".into())),
        ]))
        .execute()
        .await
        .unwrap();
    store.flush().await.unwrap();

    assert!(store.delete("Pet", &key("id1")).await.unwrap());
    let statements = db.statements.lock();
    assert!(
        statements
            .iter()
            .any(|s| s.sql.starts_with("DELETE FROM \"Pet\""))
    );
}

#[tokio::test]
async fn delete_missing_row_returns_false() {
    let (store, db) = store();
    assert!(!store.delete("Pet", &key("missing")).await.unwrap());
    // Database known empty: no DELETE issued.
    assert_eq!(db.statement_count(), 0);
}
