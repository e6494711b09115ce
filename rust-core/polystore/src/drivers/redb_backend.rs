// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Built-in persistent driver over redb.
//
// Layout: one database file per configured instance name
// (`{directory}/{name}.redb`) and one redb table per store name. redb
// is synchronous, so every transaction runs under
// `tokio::task::spawn_blocking`. Open databases are cached
// process-wide by path: redb allows only one live `Database` per file,
// and generations created by driver swaps must share the handle rather
// than fail to reopen it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, TableDefinition};
use tokio::task;
use tracing::debug;

use crate::codec::{Codec, Value};
use crate::config::{sanitize_store_name, Config};
use crate::driver::{
    with_quota_retry, DbInfo, Driver, DropTarget, IterateVisitor, MethodSet,
};
use crate::error::StoreError;

/// Process-global cache of open databases, keyed by file path.
fn databases() -> &'static Mutex<HashMap<PathBuf, Arc<Database>>> {
    static DATABASES: OnceLock<Mutex<HashMap<PathBuf, Arc<Database>>>> = OnceLock::new();
    DATABASES.get_or_init(|| Mutex::new(HashMap::new()))
}

fn table_def(store_name: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(store_name)
}

fn database_path(directory: &Path, name: &str) -> PathBuf {
    directory.join(format!("{}.redb", sanitize_store_name(name)))
}

/// Open or reuse the database for `name` under `directory`. Blocking;
/// call from `spawn_blocking`.
fn open_database(directory: &Path, name: &str) -> Result<Arc<Database>, StoreError> {
    let path = database_path(directory, name);
    let mut cache = databases()
        .lock()
        .map_err(|_| StoreError::backend("redb database cache poisoned"))?;
    if let Some(database) = cache.get(&path) {
        return Ok(Arc::clone(database));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(StoreError::backend)?;
    }
    let database = Database::create(&path).map_err(|err| {
        StoreError::Backend(format!("failed to open redb at {}: {err}", path.display()))
    })?;
    debug!(path = %path.display(), "opened redb database");

    let database = Arc::new(database);
    cache.insert(path, Arc::clone(&database));
    Ok(database)
}

/// Recover the binding's database from the type-erased handle.
fn database(db: &DbInfo) -> Result<Arc<Database>, StoreError> {
    db.handle
        .clone()
        .downcast::<Database>()
        .map_err(|_| StoreError::backend("redb driver bound to a foreign handle"))
}

fn join_error(err: task::JoinError) -> StoreError {
    StoreError::Backend(format!("task join: {err}"))
}

/// redb surfaces a full disk as an I/O error; classify those as quota
/// failures so the contract's bounded retry applies.
fn write_error(context: &str, err: impl std::fmt::Display) -> StoreError {
    let message = format!("{context}: {err}");
    if message.to_ascii_lowercase().contains("no space") {
        StoreError::QuotaExceeded(message)
    } else {
        StoreError::Backend(message)
    }
}

/// The built-in persistent driver backed by redb (pure Rust, B-tree,
/// ACID, single-file).
#[derive(Debug, Default, Clone)]
pub struct RedbDriver;

impl RedbDriver {
    pub fn new() -> Self {
        Self
    }

    /// Read the raw encoded bytes for `key`, if present.
    async fn read_raw(&self, db: &DbInfo, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let database = database(db)?;
        let store_name = db.store_name.clone();
        let key = key.to_string();

        task::spawn_blocking(move || -> Result<Option<Vec<u8>>, StoreError> {
            let txn = database
                .begin_read()
                .map_err(|err| StoreError::backend(format!("read txn: {err}")))?;
            let table = match txn.open_table(table_def(&store_name)) {
                Ok(table) => table,
                // Tables are created lazily on first write.
                Err(_) => return Ok(None),
            };
            match table.get(key.as_str()) {
                Ok(Some(guard)) => Ok(Some(guard.value().to_vec())),
                Ok(None) => Ok(None),
                Err(err) => Err(StoreError::backend(format!("get: {err}"))),
            }
        })
        .await
        .map_err(join_error)?
    }

    /// Collect every (key, encoded value) pair in key order.
    async fn read_all(&self, db: &DbInfo) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let database = database(db)?;
        let store_name = db.store_name.clone();

        task::spawn_blocking(move || -> Result<Vec<(String, Vec<u8>)>, StoreError> {
            let txn = database
                .begin_read()
                .map_err(|err| StoreError::backend(format!("read txn: {err}")))?;
            let table = match txn.open_table(table_def(&store_name)) {
                Ok(table) => table,
                Err(_) => return Ok(Vec::new()),
            };
            let mut entries = Vec::new();
            let range = table
                .range::<&str>(..)
                .map_err(|err| StoreError::backend(format!("range scan: {err}")))?;
            for entry in range {
                let (key, value) =
                    entry.map_err(|err| StoreError::backend(format!("scan entry: {err}")))?;
                entries.push((key.value().to_string(), value.value().to_vec()));
            }
            Ok(entries)
        })
        .await
        .map_err(join_error)?
    }

    async fn write_raw(&self, db: &DbInfo, key: &str, encoded: Vec<u8>) -> Result<(), StoreError> {
        let database = database(db)?;

        with_quota_retry(self.quota_retry_attempts(), || {
            let database = Arc::clone(&database);
            let store_name = db.store_name.clone();
            let key = key.to_string();
            let encoded = encoded.clone();
            async move {
                task::spawn_blocking(move || -> Result<(), StoreError> {
                    let txn = database
                        .begin_write()
                        .map_err(|err| StoreError::backend(format!("write txn: {err}")))?;
                    {
                        let mut table = txn
                            .open_table(table_def(&store_name))
                            .map_err(|err| StoreError::backend(format!("open table: {err}")))?;
                        table
                            .insert(key.as_str(), encoded.as_slice())
                            .map_err(|err| write_error("insert", err))?;
                    }
                    txn.commit().map_err(|err| write_error("commit", err))
                })
                .await
                .map_err(join_error)?
            }
        })
        .await
    }
}

#[async_trait]
impl Driver for RedbDriver {
    async fn init_storage(
        &self,
        config: &Config,
        codec: Arc<dyn Codec>,
    ) -> Result<DbInfo, StoreError> {
        let directory = config.directory.clone();
        let name = config.name.clone();
        let database = task::spawn_blocking(move || open_database(&directory, &name))
            .await
            .map_err(join_error)??;
        Ok(DbInfo::from_config(config, codec, database))
    }

    async fn get_item(&self, db: &DbInfo, key: &str) -> Result<Value, StoreError> {
        match self.read_raw(db, key).await? {
            Some(bytes) => db.codec.deserialize(&bytes),
            None => Ok(Value::Null),
        }
    }

    async fn set_item(&self, db: &DbInfo, key: &str, value: Value) -> Result<Value, StoreError> {
        let encoded = db.codec.serialize(&value)?;
        self.write_raw(db, key, encoded).await?;
        Ok(value)
    }

    async fn remove_item(&self, db: &DbInfo, key: &str) -> Result<(), StoreError> {
        let database = database(db)?;
        let store_name = db.store_name.clone();
        let key = key.to_string();

        task::spawn_blocking(move || -> Result<(), StoreError> {
            let txn = database
                .begin_write()
                .map_err(|err| StoreError::backend(format!("write txn: {err}")))?;
            {
                let mut table = txn
                    .open_table(table_def(&store_name))
                    .map_err(|err| StoreError::backend(format!("open table: {err}")))?;
                table
                    .remove(key.as_str())
                    .map_err(|err| StoreError::backend(format!("remove: {err}")))?;
            }
            txn.commit()
                .map_err(|err| StoreError::backend(format!("commit: {err}")))
        })
        .await
        .map_err(join_error)?
    }

    async fn clear(&self, db: &DbInfo) -> Result<(), StoreError> {
        let database = database(db)?;
        let store_name = db.store_name.clone();

        task::spawn_blocking(move || -> Result<(), StoreError> {
            let txn = database
                .begin_write()
                .map_err(|err| StoreError::backend(format!("write txn: {err}")))?;
            // Dropping the table is cheaper than emptying it row by
            // row; the next write recreates it.
            txn.delete_table(table_def(&store_name))
                .map_err(|err| StoreError::backend(format!("delete table: {err}")))?;
            txn.commit()
                .map_err(|err| StoreError::backend(format!("commit: {err}")))
        })
        .await
        .map_err(join_error)?
    }

    async fn length(&self, db: &DbInfo) -> Result<usize, StoreError> {
        Ok(self.keys(db).await?.len())
    }

    async fn key(&self, db: &DbInfo, index: usize) -> Result<Option<String>, StoreError> {
        Ok(self.keys(db).await?.into_iter().nth(index))
    }

    async fn keys(&self, db: &DbInfo) -> Result<Vec<String>, StoreError> {
        Ok(self
            .read_all(db)
            .await?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    async fn iterate(
        &self,
        db: &DbInfo,
        visitor: &mut IterateVisitor,
    ) -> Result<Option<Value>, StoreError> {
        // Snapshot the table, then run the visitor outside any
        // transaction so it may call back into the store.
        let entries = self.read_all(db).await?;
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
        let directory = db.directory.clone();

        match target.store_name.clone() {
            Some(store_name) => {
                task::spawn_blocking(move || -> Result<(), StoreError> {
                    let database = open_database(&directory, &name)?;
                    let txn = database
                        .begin_write()
                        .map_err(|err| StoreError::backend(format!("write txn: {err}")))?;
                    txn.delete_table(table_def(&store_name))
                        .map_err(|err| StoreError::backend(format!("delete table: {err}")))?;
                    txn.commit()
                        .map_err(|err| StoreError::backend(format!("commit: {err}")))
                })
                .await
                .map_err(join_error)?
            }
            None => {
                // Dropping the whole instance removes the file. Live
                // handles keep working on the unlinked inode until they
                // are dropped; the cache entry goes away so the next
                // initialization starts fresh.
                task::spawn_blocking(move || -> Result<(), StoreError> {
                    let path = database_path(&directory, &name);
                    if let Ok(mut cache) = databases().lock() {
                        cache.remove(&path);
                    }
                    match std::fs::remove_file(&path) {
                        Ok(()) => Ok(()),
                        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                        Err(err) => Err(StoreError::backend(err)),
                    }
                })
                .await
                .map_err(join_error)?
            }
        }
    }

    fn provided(&self) -> MethodSet {
        MethodSet::complete()
    }
}
