// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The public storage facade.
//
// Every operation normalizes its key, awaits the current generation's
// readiness, then delegates to the bound driver. The first call to
// `ensure_ready` locks the instance config for good, whatever the
// initialization outcome. Each operation also exists in a
// `*_with_callback` form: a thin adapter that spawns a task awaiting
// the same future, so both invocation styles share one code path and
// the callback never runs synchronously.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::codec::{Codec, JsonCodec, Value};
use crate::config::{Config, ConfigOptions};
use crate::driver::{DriverDescriptor, DropTarget, Method};
use crate::error::StoreError;
use crate::readiness::{Binding, Generation, ReadinessState};
use crate::registry::{global_registry, DriverRegistry};

/// A unified asynchronous key-value store over swappable drivers.
///
/// Cloning is cheap and shares the same instance state; use
/// [`Store::create_instance`] for an independent instance. All
/// instances share the process-wide driver registry.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<DriverRegistry>,
    codec: Arc<dyn Codec>,
    config: Mutex<ConfigState>,
    generation: Mutex<Arc<Generation>>,
    generation_counter: AtomicU64,
}

/// The config and its lock flag share one mutex: the first storage
/// operation must trip the flag and snapshot the config in one
/// critical section, or a racing `configure` could slip a mutation in
/// between the two.
struct ConfigState {
    config: Config,
    /// Trips on the first storage operation and never resets.
    locked: bool,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// A store with default configuration, bound to the process-wide
    /// driver registry.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: global_registry(),
                codec: Arc::new(JsonCodec),
                config: Mutex::new(ConfigState {
                    config,
                    locked: false,
                }),
                generation: Mutex::new(Arc::new(Generation::new(1, None))),
                generation_counter: AtomicU64::new(1),
            }),
        }
    }

    /// An independent instance: private config and readiness state,
    /// shared driver registry.
    pub fn create_instance(options: ConfigOptions) -> Self {
        let mut config = Config::default();
        config.apply(options);
        Self::with_config(config)
    }

    // --- configuration ---

    /// A snapshot of the current configuration. Readable even after
    /// the instance is locked.
    pub fn config(&self) -> Config {
        self.lock_config().config.clone()
    }

    /// Apply configuration changes. Fails once any storage operation
    /// has locked the instance, leaving prior values unchanged. The
    /// lock check and the mutation happen under one guard, so a
    /// `configure` racing the first storage operation either lands
    /// before its config snapshot or is rejected.
    pub fn configure(&self, options: ConfigOptions) -> Result<(), StoreError> {
        let mut state = self.lock_config();
        if state.locked {
            return Err(StoreError::ConfigLocked);
        }
        state.config.apply(options);
        Ok(())
    }

    // --- drivers and readiness ---

    /// Whether `name` is registered and passed its support probe.
    pub fn supports(&self, name: &str) -> bool {
        self.inner.registry.supports(name)
    }

    /// Register a driver in the process-wide registry.
    pub async fn define_driver(&self, descriptor: DriverDescriptor) -> Result<(), StoreError> {
        self.inner.registry.define_driver(descriptor).await
    }

    /// Name of the active driver, `None` until a generation is ready.
    pub fn driver(&self) -> Option<String> {
        match self.current_generation().state() {
            ReadinessState::Ready(name) => Some(name),
            _ => None,
        }
    }

    /// The current generation's lifecycle phase.
    pub fn readiness(&self) -> ReadinessState {
        self.current_generation().state()
    }

    /// Resolve once the active driver is initialized; rejects with the
    /// generation's terminal error if no driver could be bound.
    pub async fn ready(&self) -> Result<(), StoreError> {
        self.ensure_ready().await.map(|_| ())
    }

    /// Swap the active driver: starts a fresh readiness generation
    /// whose candidate order is `order` for this call only. The
    /// instance's configured preference order and config lock are
    /// untouched. Operations already in flight finish against the old
    /// generation's driver.
    pub async fn set_driver<I, S>(&self, order: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let order: Vec<String> = order.into_iter().map(Into::into).collect();
        let generation = {
            let number = self.inner.generation_counter.fetch_add(1, Ordering::AcqRel) + 1;
            let fresh = Arc::new(Generation::new(number, Some(order)));
            let mut current = self.lock_generation();
            *current = Arc::clone(&fresh);
            fresh
        };
        let config = self.config();
        generation
            .ensure(&self.inner.registry, config, Arc::clone(&self.inner.codec))
            .await
            .map(|_| ())
    }

    async fn ensure_ready(&self) -> Result<Arc<Binding>, StoreError> {
        // First real use locks the config, whatever the outcome. Flag
        // and snapshot are taken under the same guard.
        let config = {
            let mut state = self.lock_config();
            state.locked = true;
            state.config.clone()
        };
        let generation = self.current_generation();
        generation
            .ensure(&self.inner.registry, config, Arc::clone(&self.inner.codec))
            .await
    }

    // --- storage operations ---

    /// Fetch the value for `key`; missing keys resolve to `Null`.
    pub async fn get_item(&self, key: impl ToString) -> Result<Value, StoreError> {
        let key = normalize_key(key);
        let binding = self.ensure_ready().await?;
        binding.driver.get_item(&binding.db, &key).await
    }

    /// Store a value, echoing back the canonicalized stored value.
    pub async fn set_item(
        &self,
        key: impl ToString,
        value: impl Into<Value>,
    ) -> Result<Value, StoreError> {
        let key = normalize_key(key);
        let value = value.into();
        let binding = self.ensure_ready().await?;
        binding.driver.set_item(&binding.db, &key, value).await
    }

    pub async fn remove_item(&self, key: impl ToString) -> Result<(), StoreError> {
        let key = normalize_key(key);
        let binding = self.ensure_ready().await?;
        binding.driver.remove_item(&binding.db, &key).await
    }

    /// Remove every entry in the current store.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let binding = self.ensure_ready().await?;
        binding.driver.clear(&binding.db).await
    }

    pub async fn length(&self) -> Result<usize, StoreError> {
        let binding = self.ensure_ready().await?;
        binding.driver.length(&binding.db).await
    }

    /// The key at `index` in the driver's native ordering.
    pub async fn key(&self, index: usize) -> Result<Option<String>, StoreError> {
        let binding = self.ensure_ready().await?;
        binding.driver.key(&binding.db, index).await
    }

    pub async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let binding = self.ensure_ready().await?;
        binding.driver.keys(&binding.db).await
    }

    /// Visit every entry in driver-native order with a 1-based
    /// ordinal; the visitor's first `Some` short-circuits iteration
    /// and becomes the overall result.
    pub async fn iterate<F>(&self, mut visitor: F) -> Result<Option<Value>, StoreError>
    where
        F: FnMut(Value, &str, u64) -> Option<Value> + Send,
    {
        let binding = self.ensure_ready().await?;
        binding.driver.iterate(&binding.db, &mut visitor).await
    }

    /// Drop a whole store. With no target, drops the current binding's
    /// name and store name; a target name without a store name drops
    /// every store under that name. Drivers that do not declare
    /// `drop_instance` reject without being called.
    pub async fn drop_instance(&self, target: Option<DropTarget>) -> Result<(), StoreError> {
        let binding = self.ensure_ready().await?;
        if !binding.methods.contains(Method::DropInstance) {
            return Err(StoreError::DropInstanceNotImplemented);
        }
        let mut target = target.unwrap_or_default();
        if target.name.is_none() {
            target.name = Some(binding.db.name.clone());
            target.store_name = target
                .store_name
                .take()
                .or_else(|| Some(binding.db.store_name.clone()));
        }
        binding.driver.drop_instance(&binding.db, &target).await
    }

    // --- callback adapters ---

    pub fn ready_with_callback<C>(&self, callback: C)
    where
        C: FnOnce(Result<(), StoreError>) + Send + 'static,
    {
        let store = self.clone();
        execute_callback(async move { store.ready().await }, callback);
    }

    pub fn set_driver_with_callback<C>(&self, order: Vec<String>, callback: C)
    where
        C: FnOnce(Result<(), StoreError>) + Send + 'static,
    {
        let store = self.clone();
        execute_callback(async move { store.set_driver(order).await }, callback);
    }

    pub fn define_driver_with_callback<C>(&self, descriptor: DriverDescriptor, callback: C)
    where
        C: FnOnce(Result<(), StoreError>) + Send + 'static,
    {
        let store = self.clone();
        execute_callback(async move { store.define_driver(descriptor).await }, callback);
    }

    pub fn get_item_with_callback<C>(&self, key: impl ToString, callback: C)
    where
        C: FnOnce(Result<Value, StoreError>) + Send + 'static,
    {
        let store = self.clone();
        let key = key.to_string();
        execute_callback(async move { store.get_item(key).await }, callback);
    }

    pub fn set_item_with_callback<C>(&self, key: impl ToString, value: impl Into<Value>, callback: C)
    where
        C: FnOnce(Result<Value, StoreError>) + Send + 'static,
    {
        let store = self.clone();
        let key = key.to_string();
        let value = value.into();
        execute_callback(async move { store.set_item(key, value).await }, callback);
    }

    pub fn remove_item_with_callback<C>(&self, key: impl ToString, callback: C)
    where
        C: FnOnce(Result<(), StoreError>) + Send + 'static,
    {
        let store = self.clone();
        let key = key.to_string();
        execute_callback(async move { store.remove_item(key).await }, callback);
    }

    pub fn clear_with_callback<C>(&self, callback: C)
    where
        C: FnOnce(Result<(), StoreError>) + Send + 'static,
    {
        let store = self.clone();
        execute_callback(async move { store.clear().await }, callback);
    }

    pub fn length_with_callback<C>(&self, callback: C)
    where
        C: FnOnce(Result<usize, StoreError>) + Send + 'static,
    {
        let store = self.clone();
        execute_callback(async move { store.length().await }, callback);
    }

    pub fn key_with_callback<C>(&self, index: usize, callback: C)
    where
        C: FnOnce(Result<Option<String>, StoreError>) + Send + 'static,
    {
        let store = self.clone();
        execute_callback(async move { store.key(index).await }, callback);
    }

    pub fn keys_with_callback<C>(&self, callback: C)
    where
        C: FnOnce(Result<Vec<String>, StoreError>) + Send + 'static,
    {
        let store = self.clone();
        execute_callback(async move { store.keys().await }, callback);
    }

    pub fn iterate_with_callback<F, C>(&self, visitor: F, callback: C)
    where
        F: FnMut(Value, &str, u64) -> Option<Value> + Send + 'static,
        C: FnOnce(Result<Option<Value>, StoreError>) + Send + 'static,
    {
        let store = self.clone();
        execute_callback(async move { store.iterate(visitor).await }, callback);
    }

    pub fn drop_instance_with_callback<C>(&self, target: Option<DropTarget>, callback: C)
    where
        C: FnOnce(Result<(), StoreError>) + Send + 'static,
    {
        let store = self.clone();
        execute_callback(async move { store.drop_instance(target).await }, callback);
    }

    // --- internals ---

    fn current_generation(&self) -> Arc<Generation> {
        Arc::clone(&self.lock_generation())
    }

    fn lock_generation(&self) -> std::sync::MutexGuard<'_, Arc<Generation>> {
        match self.inner.generation.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_config(&self) -> std::sync::MutexGuard<'_, ConfigState> {
        match self.inner.config.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config())
            .field("readiness", &self.readiness())
            .finish()
    }
}

/// Canonicalize a key to its string form. Non-string keys are
/// stringified through `Display`, so `42` and `"42"` address the same
/// entry.
fn normalize_key(key: impl ToString) -> String {
    key.to_string()
}

/// Run `future` to completion on a spawned task and hand its settled
/// result to `callback` exactly once, never synchronously. Requires a
/// tokio runtime context.
fn execute_callback<T, F, C>(future: F, callback: C)
where
    T: Send + 'static,
    F: Future<Output = Result<T, StoreError>> + Send + 'static,
    C: FnOnce(Result<T, StoreError>) + Send + 'static,
{
    tokio::spawn(async move {
        callback(future.await);
    });
}
