// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The readiness engine: one generation per active-driver lifecycle.
//
// A generation walks the preference order, runs at most one successful
// `init_storage`, and stores a terminal result that every pending and
// future caller shares. Concurrent callers coalesce onto the same
// in-flight initialization through a `tokio::sync::OnceCell`; a driver
// swap replaces the generation rather than mutating it, so operations
// already bound to the old generation finish against the old driver.

use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::codec::Codec;
use crate::config::Config;
use crate::driver::{DbInfo, Driver, MethodSet};
use crate::error::StoreError;
use crate::registry::DriverRegistry;

/// Lifecycle phase of one readiness generation.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadinessState {
    Unstarted,
    Selecting,
    Initializing(String),
    Ready(String),
    Failed(StoreError),
}

/// The active driver binding produced by a successful generation.
pub(crate) struct Binding {
    pub name: String,
    pub driver: Arc<dyn Driver>,
    pub methods: MethodSet,
    pub db: DbInfo,
}

/// One readiness lifecycle: selection, initialization, then a terminal
/// ready or failed result.
pub(crate) struct Generation {
    number: u64,
    /// Call-scoped preference order from `set_driver`; `None` falls
    /// back to the instance config's order at drive time.
    order: Option<Vec<String>>,
    state: Mutex<ReadinessState>,
    cell: OnceCell<Result<Arc<Binding>, StoreError>>,
}

impl Generation {
    pub fn new(number: u64, order: Option<Vec<String>>) -> Self {
        Self {
            number,
            order,
            state: Mutex::new(ReadinessState::Unstarted),
            cell: OnceCell::new(),
        }
    }

    pub fn state(&self) -> ReadinessState {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_state(&self, next: ReadinessState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    /// Resolve this generation's binding, driving selection and
    /// initialization exactly once no matter how many callers arrive.
    /// The stored result is terminal: later calls re-surface it
    /// without re-attempting any driver.
    pub async fn ensure(
        &self,
        registry: &DriverRegistry,
        config: Config,
        codec: Arc<dyn Codec>,
    ) -> Result<Arc<Binding>, StoreError> {
        self.cell
            .get_or_init(|| self.drive(registry, config, codec))
            .await
            .clone()
    }

    async fn drive(
        &self,
        registry: &DriverRegistry,
        config: Config,
        codec: Arc<dyn Codec>,
    ) -> Result<Arc<Binding>, StoreError> {
        self.set_state(ReadinessState::Selecting);
        let requested = self
            .order
            .clone()
            .unwrap_or_else(|| config.driver_order.clone());
        let candidates = registry.list_preferred(&requested);

        if candidates.is_empty() {
            warn!(
                generation = self.number,
                ?requested,
                "no registered, supported driver in preference order"
            );
            self.set_state(ReadinessState::Failed(StoreError::NoAvailableDriver));
            return Err(StoreError::NoAvailableDriver);
        }

        for name in candidates {
            let Some((driver, methods)) = registry.lookup(&name) else {
                continue;
            };
            self.set_state(ReadinessState::Initializing(name.clone()));
            debug!(generation = self.number, driver = %name, "initializing storage driver");

            match driver.init_storage(&config, Arc::clone(&codec)).await {
                Ok(db) => {
                    info!(generation = self.number, driver = %name, "storage driver ready");
                    self.set_state(ReadinessState::Ready(name.clone()));
                    return Ok(Arc::new(Binding {
                        name,
                        driver,
                        methods,
                        db,
                    }));
                }
                Err(err) => {
                    warn!(
                        generation = self.number,
                        driver = %name,
                        %err,
                        "driver initialization failed, trying next candidate"
                    );
                }
            }
        }

        self.set_state(ReadinessState::Failed(StoreError::NoAvailableDriver));
        Err(StoreError::NoAvailableDriver)
    }
}
