// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end tests of the storage facade against the in-memory driver.
// Memory tables are process-global and keyed by instance name, so each
// test uses its own name.

use polystore::{ConfigOptions, DropTarget, Store, StoreError, Value};
use tokio::sync::oneshot;

fn memory_store(name: &str) -> Store {
    Store::create_instance(ConfigOptions::new().name(name).driver(["memory"]))
}

#[tokio::test]
async fn test_set_then_get_round_trip() {
    let store = memory_store("facade-roundtrip");
    store.set_item("greeting", "hello").await.unwrap();

    let value = store.get_item("greeting").await.unwrap();
    assert_eq!(value.as_text(), Some("hello"));
}

#[tokio::test]
async fn test_missing_key_resolves_to_null() {
    let store = memory_store("facade-missing");
    assert_eq!(store.get_item("never-set").await.unwrap(), Value::Null);
}

#[tokio::test]
async fn test_absent_value_canonicalizes_to_null() {
    let store = memory_store("facade-absent");

    let echoed = store.set_item("k", Option::<String>::None).await.unwrap();
    assert_eq!(echoed, Value::Null);
    assert_eq!(store.get_item("k").await.unwrap(), Value::Null);
    // The entry exists even though its value is null.
    assert_eq!(store.length().await.unwrap(), 1);
}

#[tokio::test]
async fn test_set_item_echoes_the_stored_value() {
    let store = memory_store("facade-echo");
    let echoed = store.set_item("n", 3.5).await.unwrap();
    assert_eq!(echoed, Value::Number(3.5));
}

#[tokio::test]
async fn test_non_string_keys_are_stringified() {
    let store = memory_store("facade-keynorm");
    store.set_item(42, "answer").await.unwrap();

    let value = store.get_item("42").await.unwrap();
    assert_eq!(value.as_text(), Some("answer"));
    assert_eq!(store.keys().await.unwrap(), vec!["42"]);
}

#[tokio::test]
async fn test_length_keys_and_key_index() {
    let store = memory_store("facade-enumeration");
    for key in ["b", "a", "c"] {
        store.set_item(key, 1.0).await.unwrap();
    }

    assert_eq!(store.length().await.unwrap(), 3);
    assert_eq!(store.keys().await.unwrap(), vec!["a", "b", "c"]);
    assert_eq!(store.key(0).await.unwrap().as_deref(), Some("a"));
    assert_eq!(store.key(2).await.unwrap().as_deref(), Some("c"));
    assert_eq!(store.key(3).await.unwrap(), None);
}

#[tokio::test]
async fn test_remove_item() {
    let store = memory_store("facade-remove");
    store.set_item("k", true).await.unwrap();
    store.remove_item("k").await.unwrap();

    assert_eq!(store.get_item("k").await.unwrap(), Value::Null);
    assert_eq!(store.length().await.unwrap(), 0);
    // Removing a missing key is not an error.
    store.remove_item("k").await.unwrap();
}

#[tokio::test]
async fn test_clear_empties_the_store() {
    let store = memory_store("facade-clear");
    store.set_item("a", 1.0).await.unwrap();
    store.set_item("b", 2.0).await.unwrap();

    store.clear().await.unwrap();
    assert_eq!(store.length().await.unwrap(), 0);
    assert_eq!(store.keys().await.unwrap(), Vec::<String>::new());
}

#[tokio::test]
async fn test_iterate_visits_every_entry_with_ordinals() {
    let store = memory_store("facade-iterate");
    store.set_item("a", 1.0).await.unwrap();
    store.set_item("b", 2.0).await.unwrap();

    let mut visited = Vec::new();
    let result = store
        .iterate(|value, key, ordinal| {
            visited.push((key.to_string(), value, ordinal));
            None
        })
        .await
        .unwrap();

    assert_eq!(result, None);
    assert_eq!(
        visited,
        vec![
            ("a".to_string(), Value::Number(1.0), 1),
            ("b".to_string(), Value::Number(2.0), 2),
        ]
    );
}

#[tokio::test]
async fn test_iterate_short_circuits_on_some() {
    let store = memory_store("facade-iterate-stop");
    store.set_item("a", 1.0).await.unwrap();
    store.set_item("b", 2.0).await.unwrap();
    store.set_item("c", 3.0).await.unwrap();

    let mut visits = 0;
    let result = store
        .iterate(|value, _key, _ordinal| {
            visits += 1;
            if value == Value::Number(2.0) {
                Some(Value::Text("found".into()))
            } else {
                None
            }
        })
        .await
        .unwrap();

    assert_eq!(result, Some(Value::Text("found".into())));
    assert_eq!(visits, 2);
}

#[tokio::test]
async fn test_instances_with_different_names_are_isolated() {
    let first = memory_store("facade-isolated-one");
    let second = memory_store("facade-isolated-two");

    first.set_item("k", "one").await.unwrap();
    assert_eq!(second.get_item("k").await.unwrap(), Value::Null);
}

#[tokio::test]
async fn test_instances_with_the_same_name_share_data() {
    let first = memory_store("facade-shared");
    let second = memory_store("facade-shared");

    first.set_item("k", "shared").await.unwrap();
    assert_eq!(
        second.get_item("k").await.unwrap().as_text(),
        Some("shared")
    );
}

#[tokio::test]
async fn test_store_names_partition_an_instance() {
    let base = ConfigOptions::new().name("facade-stores").driver(["memory"]);
    let first = Store::create_instance(base.clone().store_name("alpha"));
    let second = Store::create_instance(base.store_name("beta"));

    first.set_item("k", 1.0).await.unwrap();
    assert_eq!(second.get_item("k").await.unwrap(), Value::Null);
}

#[tokio::test]
async fn test_structured_values_round_trip() {
    let store = memory_store("facade-structured");

    let value = Value::from(vec![
        Value::from("nested"),
        Value::from(1.25),
        Value::Bytes(vec![1, 2, 3]),
    ]);
    store.set_item("doc", value.clone()).await.unwrap();
    assert_eq!(store.get_item("doc").await.unwrap(), value);
}

#[tokio::test]
async fn test_quota_exceeded_surfaces_after_retry() {
    let store = Store::create_instance(
        ConfigOptions::new()
            .name("facade-quota")
            .driver(["memory"])
            .size(16),
    );

    let oversized = "x".repeat(64);
    let err = store.set_item("big", oversized.as_str()).await.unwrap_err();
    assert!(matches!(err, StoreError::QuotaExceeded(_)));
    // Nothing was stored.
    assert_eq!(store.length().await.unwrap(), 0);
}

#[tokio::test]
async fn test_drop_instance_defaults_to_current_store() {
    let store = memory_store("facade-drop");
    store.set_item("k", true).await.unwrap();

    store.drop_instance(None).await.unwrap();
    assert_eq!(store.length().await.unwrap(), 0);
}

#[tokio::test]
async fn test_drop_instance_by_name_clears_all_stores() {
    let base = ConfigOptions::new().name("facade-drop-all").driver(["memory"]);
    let first = Store::create_instance(base.clone().store_name("alpha"));
    let second = Store::create_instance(base.store_name("beta"));
    first.set_item("k", 1.0).await.unwrap();
    second.set_item("k", 2.0).await.unwrap();

    first
        .drop_instance(Some(DropTarget {
            name: Some("facade-drop-all".into()),
            store_name: None,
        }))
        .await
        .unwrap();

    assert_eq!(first.length().await.unwrap(), 0);
    assert_eq!(second.length().await.unwrap(), 0);
}

#[tokio::test]
async fn test_callback_style_set_and_get() {
    let store = memory_store("facade-callbacks");

    let (set_tx, set_rx) = oneshot::channel();
    store.set_item_with_callback("k", "via callback", move |result| {
        let _ = set_tx.send(result);
    });
    set_rx.await.unwrap().unwrap();

    let (get_tx, get_rx) = oneshot::channel();
    store.get_item_with_callback("k", move |result| {
        let _ = get_tx.send(result);
    });
    let value = get_rx.await.unwrap().unwrap();
    assert_eq!(value.as_text(), Some("via callback"));
}

#[tokio::test]
async fn test_callback_style_surfaces_errors() {
    let store =
        Store::create_instance(ConfigOptions::new().name("facade-callback-err").driver(["nosuch"]));

    let (tx, rx) = oneshot::channel();
    store.ready_with_callback(move |result| {
        let _ = tx.send(result);
    });
    let err = rx.await.unwrap().unwrap_err();
    assert_eq!(err, StoreError::NoAvailableDriver);
}

#[tokio::test]
async fn test_callback_enumeration_operations() {
    let store = memory_store("facade-callback-enum");
    store.set_item("a", 1.0).await.unwrap();
    store.set_item("b", 2.0).await.unwrap();

    let (len_tx, len_rx) = oneshot::channel();
    store.length_with_callback(move |result| {
        let _ = len_tx.send(result);
    });
    assert_eq!(len_rx.await.unwrap().unwrap(), 2);

    let (keys_tx, keys_rx) = oneshot::channel();
    store.keys_with_callback(move |result| {
        let _ = keys_tx.send(result);
    });
    assert_eq!(keys_rx.await.unwrap().unwrap(), vec!["a", "b"]);

    let (iter_tx, iter_rx) = oneshot::channel();
    store.iterate_with_callback(
        |_value, key, _ordinal| {
            if key == "b" {
                Some(Value::Text("stopped".into()))
            } else {
                None
            }
        },
        move |result| {
            let _ = iter_tx.send(result);
        },
    );
    assert_eq!(
        iter_rx.await.unwrap().unwrap(),
        Some(Value::Text("stopped".into()))
    );
}

#[tokio::test]
async fn test_config_round_trips_through_create_instance() {
    let store = Store::create_instance(
        ConfigOptions::new()
            .name("facade-config")
            .store_name("customstore")
            .version(2.0)
            .size(1024)
            .description("test instance")
            .driver(["memory"]),
    );

    let config = store.config();
    assert_eq!(config.name, "facade-config");
    assert_eq!(config.store_name, "customstore");
    assert_eq!(config.version, 2.0);
    assert_eq!(config.size, 1024);
    assert_eq!(config.description, "test instance");
    assert_eq!(config.driver_order, vec!["memory"]);
}
