// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The redb driver behind the full facade: negotiation by default
// order, persistence across instances, and instance dropping.

#![cfg(feature = "redb-driver")]

use std::path::Path;

use polystore::{ConfigOptions, Store, Value};
use tempfile::tempdir;

fn redb_store(dir: &Path, name: &str) -> Store {
    Store::create_instance(
        ConfigOptions::new()
            .name(name)
            .directory(dir)
            .driver(["redb"]),
    )
}

#[tokio::test]
async fn test_default_order_prefers_redb() {
    let dir = tempdir().unwrap();
    let store = Store::create_instance(
        ConfigOptions::new()
            .name("redbint-default")
            .directory(dir.path()),
    );

    store.ready().await.unwrap();
    assert_eq!(store.driver().as_deref(), Some("redb"));
}

#[tokio::test]
async fn test_values_persist_across_instances() {
    let dir = tempdir().unwrap();

    let writer = redb_store(dir.path(), "redbint-persist");
    writer.set_item("k", "durable").await.unwrap();

    let reader = redb_store(dir.path(), "redbint-persist");
    let value = reader.get_item("k").await.unwrap();
    assert_eq!(value.as_text(), Some("durable"));
}

#[tokio::test]
async fn test_enumeration_through_the_facade() {
    let dir = tempdir().unwrap();
    let store = redb_store(dir.path(), "redbint-enum");

    for key in ["b", "a"] {
        store.set_item(key, 1.0).await.unwrap();
    }
    assert_eq!(store.length().await.unwrap(), 2);
    assert_eq!(store.keys().await.unwrap(), vec!["a", "b"]);
    assert_eq!(store.key(0).await.unwrap().as_deref(), Some("a"));

    let mut ordinals = Vec::new();
    let result = store
        .iterate(|_value, _key, ordinal| {
            ordinals.push(ordinal);
            None
        })
        .await
        .unwrap();
    assert_eq!(result, None);
    assert_eq!(ordinals, vec![1, 2]);
}

#[tokio::test]
async fn test_binary_values_survive_the_disk_round_trip() {
    let dir = tempdir().unwrap();
    let store = redb_store(dir.path(), "redbint-binary");

    let payload = Value::Bytes((0u8..=255).collect());
    store.set_item("blob", payload.clone()).await.unwrap();
    assert_eq!(store.get_item("blob").await.unwrap(), payload);
}

#[tokio::test]
async fn test_drop_instance_through_the_facade() {
    let dir = tempdir().unwrap();
    let store = redb_store(dir.path(), "redbint-drop");

    store.set_item("k", true).await.unwrap();
    store.drop_instance(None).await.unwrap();
    assert_eq!(store.length().await.unwrap(), 0);
}
