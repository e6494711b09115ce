// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Process-wide catalog of storage drivers.
//
// The registry is append/overwrite-only and shared by every facade
// instance: built-ins are installed at construction, user drivers go
// through `define_driver`, which validates the descriptor structurally
// and runs its support probe exactly once. Per-instance state (config,
// readiness) never lives here.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use tracing::info;

use crate::driver::{Driver, DriverDescriptor, MethodSet};
use crate::error::StoreError;

struct Registered {
    driver: Arc<dyn Driver>,
    methods: MethodSet,
    supported: bool,
}

/// A catalog of named driver registrations with their probed support
/// flags.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: RwLock<HashMap<String, Registered>>,
}

impl DriverRegistry {
    /// An empty registry with no built-ins, mainly for tests.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the built-in drivers.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_builtin(
            crate::MEMORY_DRIVER,
            Arc::new(crate::drivers::MemoryDriver::new()),
        );
        #[cfg(feature = "redb-driver")]
        registry.register_builtin(
            crate::REDB_DRIVER,
            Arc::new(crate::drivers::RedbDriver::new()),
        );
        registry
    }

    /// Built-ins bypass the compliance check; they implement the full
    /// contract by construction and are always supported here.
    fn register_builtin(&self, name: &str, driver: Arc<dyn Driver>) {
        let methods = driver.provided();
        if let Ok(mut drivers) = self.drivers.write() {
            drivers.insert(
                name.to_string(),
                Registered {
                    driver,
                    methods,
                    supported: true,
                },
            );
        }
    }

    /// Validate, probe, and store a driver registration, overwriting
    /// any prior registration under the same name.
    ///
    /// Structural validation requires a non-empty name and coverage of
    /// every required contract method; failures reject with the fixed
    /// compliance message and leave the registry untouched.
    pub async fn define_driver(&self, descriptor: DriverDescriptor) -> Result<(), StoreError> {
        if descriptor.name.is_empty() {
            return Err(StoreError::DriverNotCompliant);
        }
        let methods = descriptor.driver.provided();
        if !methods.contains_all(MethodSet::required()) {
            return Err(StoreError::DriverNotCompliant);
        }

        let supported = descriptor.support.evaluate().await;
        info!(driver = %descriptor.name, supported, "registered storage driver");

        let mut drivers = self
            .drivers
            .write()
            .map_err(|_| StoreError::backend("driver registry lock poisoned"))?;
        drivers.insert(
            descriptor.name,
            Registered {
                driver: descriptor.driver,
                methods,
                supported,
            },
        );
        Ok(())
    }

    /// The last-probed support flag; `false` for unregistered names.
    pub fn supports(&self, name: &str) -> bool {
        self.drivers
            .read()
            .map(|drivers| drivers.get(name).is_some_and(|r| r.supported))
            .unwrap_or(false)
    }

    /// Look up a registered driver and its declared method set.
    pub(crate) fn lookup(&self, name: &str) -> Option<(Arc<dyn Driver>, MethodSet)> {
        self.drivers
            .read()
            .ok()?
            .get(name)
            .map(|r| (Arc::clone(&r.driver), r.methods))
    }

    /// Filter `order` down to names that are registered and currently
    /// supported, preserving the requested relative order.
    pub fn list_preferred(&self, order: &[String]) -> Vec<String> {
        let Ok(drivers) = self.drivers.read() else {
            return Vec::new();
        };
        order
            .iter()
            .filter(|name| drivers.get(*name).is_some_and(|r| r.supported))
            .cloned()
            .collect()
    }
}

/// The process-wide registry shared by every `Store`.
pub(crate) fn global_registry() -> Arc<DriverRegistry> {
    static REGISTRY: OnceLock<Arc<DriverRegistry>> = OnceLock::new();
    Arc::clone(REGISTRY.get_or_init(|| Arc::new(DriverRegistry::with_builtins())))
}
