// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Polystore: a unified asynchronous key-value facade over pluggable
//! storage drivers.
//!
//! An instance holds a preference-ordered list of drivers and lazily
//! negotiates the first registered, supported one on first use. All
//! storage operations funnel through the readiness engine, so callers
//! never race initialization: they await the shared result of the one
//! in-flight driver setup. Values are structured ([`codec::Value`]) and
//! serialized per driver through a [`Codec`].
//!
//! # Modules
//!
//! - [`store`] -- The `Store` facade: configuration, driver negotiation,
//!   and the full storage API (promise-style and callback-style).
//! - [`driver`] -- The `Driver` trait every backend implements, plus the
//!   `MethodSet` compliance surface and support probes.
//! - [`registry`] -- The process-wide driver registry with structural
//!   validation at registration time.
//! - [`readiness`] -- Generations: one coalesced initialization per
//!   active-driver lifecycle.
//! - [`config`] -- Instance configuration and its one-time lock.
//! - [`codec`] -- The `Value` model and the tagged JSON wire codec.
//! - [`error`] -- The `StoreError` enum covering all failure modes.
//! - [`drivers`] -- Built-in backends: in-memory, and redb when the
//!   `redb-driver` feature is enabled.
//!
//! # Example
//!
//! ```rust
//! use polystore::{ConfigOptions, Store};
//!
//! # tokio_test::block_on(async {
//! let store = Store::create_instance(
//!     ConfigOptions::new().name("example").driver(["memory"]),
//! );
//! store.set_item("greeting", "hello").await.unwrap();
//!
//! let value = store.get_item("greeting").await.unwrap();
//! assert_eq!(value.as_text(), Some("hello"));
//! # });
//! ```

pub mod codec;
pub mod config;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod readiness;
pub mod registry;
pub mod store;

pub use codec::{Codec, JsonCodec, Value};
pub use config::{Config, ConfigOptions};
pub use driver::{
    DbInfo, Driver, DriverDescriptor, DropTarget, IterateVisitor, Method, MethodSet, SupportProbe,
};
pub use error::StoreError;
pub use readiness::ReadinessState;
pub use registry::DriverRegistry;
pub use store::Store;

pub use drivers::MemoryDriver;

#[cfg(feature = "redb-driver")]
pub use drivers::RedbDriver;

/// Registry name of the built-in in-memory driver.
pub const MEMORY_DRIVER: &str = "memory";

/// Registry name of the built-in redb driver.
#[cfg(feature = "redb-driver")]
pub const REDB_DRIVER: &str = "redb";

/// The shared default instance, created on first access with default
/// configuration. Library users who want isolated stores call
/// [`Store::create_instance`] instead.
pub fn store() -> &'static Store {
    use std::sync::OnceLock;
    static DEFAULT: OnceLock<Store> = OnceLock::new();
    DEFAULT.get_or_init(Store::new)
}
