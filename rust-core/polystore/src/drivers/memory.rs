// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Built-in in-memory driver.
//
// Tables are sorted `BTreeMap`s under tokio `RwLock`s, held in a
// process-global registry keyed by the instance's key prefix. Data
// therefore survives driver swaps within the process and is shared by
// facades configured with the same name and store name, the way a real
// shared backend behaves. Values are stored codec-encoded so the
// serialization boundary is exercised even in memory.
//
// The configured `size` is enforced as a byte budget over keys and
// encoded values; exceeding it is a quota failure, retried once per
// the contract's bounded retry policy.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::codec::{Codec, Value};
use crate::config::Config;
use crate::driver::{
    with_quota_retry, DbInfo, Driver, DropTarget, IterateVisitor, MethodSet,
};
use crate::error::StoreError;

type Table = Arc<RwLock<BTreeMap<String, Vec<u8>>>>;

/// Process-global table registry, keyed by key prefix.
fn tables() -> &'static Mutex<HashMap<String, Table>> {
    static TABLES: OnceLock<Mutex<HashMap<String, Table>>> = OnceLock::new();
    TABLES.get_or_init(|| Mutex::new(HashMap::new()))
}

fn table_for(prefix: &str) -> Result<Table, StoreError> {
    let mut registry = tables()
        .lock()
        .map_err(|_| StoreError::backend("memory table registry poisoned"))?;
    Ok(Arc::clone(registry.entry(prefix.to_string()).or_default()))
}

/// Recover the binding's table from the type-erased handle.
fn table(db: &DbInfo) -> Result<Table, StoreError> {
    db.handle
        .clone()
        .downcast::<RwLock<BTreeMap<String, Vec<u8>>>>()
        .map_err(|_| StoreError::backend("memory driver bound to a foreign handle"))
}

/// The built-in in-memory driver: ephemeral, always supported.
#[derive(Debug, Default, Clone)]
pub struct MemoryDriver;

impl MemoryDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn init_storage(
        &self,
        config: &Config,
        codec: Arc<dyn Codec>,
    ) -> Result<DbInfo, StoreError> {
        let prefix = config.key_prefix();
        let table = table_for(&prefix)?;
        debug!(%prefix, "memory driver bound");
        Ok(DbInfo::from_config(config, codec, table))
    }

    async fn get_item(&self, db: &DbInfo, key: &str) -> Result<Value, StoreError> {
        let table = table(db)?;
        let guard = table.read().await;
        match guard.get(key) {
            Some(bytes) => db.codec.deserialize(bytes),
            None => Ok(Value::Null),
        }
    }

    async fn set_item(&self, db: &DbInfo, key: &str, value: Value) -> Result<Value, StoreError> {
        let encoded = db.codec.serialize(&value)?;
        let table = table(db)?;

        with_quota_retry(self.quota_retry_attempts(), || {
            let table = Arc::clone(&table);
            let key = key.to_string();
            let encoded = encoded.clone();
            let budget = db.size;
            async move {
                let mut guard = table.write().await;
                let occupied: u64 = guard
                    .iter()
                    .filter(|(existing, _)| existing.as_str() != key)
                    .map(|(k, v)| (k.len() + v.len()) as u64)
                    .sum();
                let projected = occupied + (key.len() + encoded.len()) as u64;
                if projected > budget {
                    return Err(StoreError::QuotaExceeded(format!(
                        "{projected} bytes needed, budget is {budget} bytes"
                    )));
                }
                guard.insert(key, encoded);
                Ok(())
            }
        })
        .await?;

        Ok(value)
    }

    async fn remove_item(&self, db: &DbInfo, key: &str) -> Result<(), StoreError> {
        let table = table(db)?;
        table.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self, db: &DbInfo) -> Result<(), StoreError> {
        let table = table(db)?;
        table.write().await.clear();
        Ok(())
    }

    async fn length(&self, db: &DbInfo) -> Result<usize, StoreError> {
        let table = table(db)?;
        let guard = table.read().await;
        Ok(guard.len())
    }

    async fn key(&self, db: &DbInfo, index: usize) -> Result<Option<String>, StoreError> {
        let table = table(db)?;
        let guard = table.read().await;
        Ok(guard.keys().nth(index).cloned())
    }

    async fn keys(&self, db: &DbInfo) -> Result<Vec<String>, StoreError> {
        let table = table(db)?;
        let guard = table.read().await;
        Ok(guard.keys().cloned().collect())
    }

    async fn iterate(
        &self,
        db: &DbInfo,
        visitor: &mut IterateVisitor,
    ) -> Result<Option<Value>, StoreError> {
        let table = table(db)?;
        // Snapshot under the read lock; the visitor runs unlocked so it
        // may call back into the store.
        let entries: Vec<(String, Vec<u8>)> = table
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (ordinal, (key, bytes)) in entries.into_iter().enumerate() {
            let value = db.codec.deserialize(&bytes)?;
            if let Some(result) = visitor(value, &key, ordinal as u64 + 1) {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    async fn drop_instance(&self, db: &DbInfo, target: &DropTarget) -> Result<(), StoreError> {
        let name = target.name.clone().unwrap_or_else(|| db.name.clone());

        let dropped: Vec<Table> = {
            let mut registry = tables()
                .lock()
                .map_err(|_| StoreError::backend("memory table registry poisoned"))?;
            match &target.store_name {
                Some(store_name) => {
                    let prefix = crate::config::prefix_for(&name, store_name);
                    registry.remove(&prefix).into_iter().collect()
                }
                None => {
                    // Drop every store under the name.
                    let instance_prefix = format!("{name}/");
                    let doomed: Vec<String> = registry
                        .keys()
                        .filter(|prefix| prefix.starts_with(&instance_prefix))
                        .cloned()
                        .collect();
                    doomed
                        .into_iter()
                        .filter_map(|prefix| registry.remove(&prefix))
                        .collect()
                }
            }
        };

        // Live bindings still hold the tables; empty them so the drop
        // is observable there too.
        for table in dropped {
            table.write().await.clear();
        }
        Ok(())
    }

    fn provided(&self) -> MethodSet {
        MethodSet::complete()
    }
}
