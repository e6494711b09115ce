// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The driver contract: the structural interface every storage backend
// implements, plus the registration-time descriptor around it.
//
// Drivers are stateless objects; all per-binding state lives in the
// `DbInfo` produced by `init_storage` and threaded back into every
// call. A driver swap replaces the `DbInfo` wholesale, never mutates
// it, so in-flight operations on the previous binding keep a
// consistent view.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::debug;

use crate::codec::{Codec, Value};
use crate::config::Config;
use crate::error::StoreError;

/// One method of the driver contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    InitStorage,
    Iterate,
    GetItem,
    SetItem,
    RemoveItem,
    Clear,
    Length,
    Key,
    Keys,
    DropInstance,
}

impl Method {
    const fn bit(self) -> u16 {
        1 << self as u16
    }
}

/// The set of contract methods a driver declares it implements.
///
/// Registration validates that a driver covers [`MethodSet::required`];
/// `DropInstance` is the only optional method. The facade consults the
/// set before delegating `drop_instance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MethodSet(u16);

impl MethodSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every method the contract requires.
    pub const fn required() -> Self {
        Self::empty()
            .with(Method::InitStorage)
            .with(Method::Iterate)
            .with(Method::GetItem)
            .with(Method::SetItem)
            .with(Method::RemoveItem)
            .with(Method::Clear)
            .with(Method::Length)
            .with(Method::Key)
            .with(Method::Keys)
    }

    /// Required methods plus `DropInstance`.
    pub const fn complete() -> Self {
        Self::required().with(Method::DropInstance)
    }

    pub const fn with(self, method: Method) -> Self {
        Self(self.0 | method.bit())
    }

    pub const fn without(self, method: Method) -> Self {
        Self(self.0 & !method.bit())
    }

    pub const fn contains(self, method: Method) -> bool {
        self.0 & method.bit() != 0
    }

    pub const fn contains_all(self, other: MethodSet) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Capability probe attached to a driver registration.
pub enum SupportProbe {
    /// No probe supplied: assume the driver works in this environment.
    Assume,
    /// A probe already evaluated at descriptor construction time.
    Flag(bool),
    /// An asynchronous probe run once at registration time.
    Probe(Box<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>),
}

impl SupportProbe {
    pub(crate) async fn evaluate(&self) -> bool {
        match self {
            SupportProbe::Assume => true,
            SupportProbe::Flag(supported) => *supported,
            SupportProbe::Probe(probe) => probe().await,
        }
    }
}

impl fmt::Debug for SupportProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupportProbe::Assume => write!(f, "Assume"),
            SupportProbe::Flag(supported) => write!(f, "Flag({supported})"),
            SupportProbe::Probe(_) => write!(f, "Probe(..)"),
        }
    }
}

/// A named driver offered for registration.
pub struct DriverDescriptor {
    /// Unique registry key; empty names fail compliance validation.
    pub name: String,
    pub support: SupportProbe,
    pub driver: Arc<dyn Driver>,
}

impl DriverDescriptor {
    pub fn new(name: impl Into<String>, driver: Arc<dyn Driver>) -> Self {
        Self {
            name: name.into(),
            support: SupportProbe::Assume,
            driver,
        }
    }

    pub fn with_support(mut self, support: SupportProbe) -> Self {
        self.support = support;
        self
    }
}

impl fmt::Debug for DriverDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverDescriptor")
            .field("name", &self.name)
            .field("support", &self.support)
            .finish()
    }
}

/// Per-binding storage info: the driver-reported config echo, the
/// injected codec, and the type-erased backend handle.
///
/// Owned by exactly one readiness generation and replaced, never
/// mutated, on driver swap.
#[derive(Clone)]
pub struct DbInfo {
    pub name: String,
    pub store_name: String,
    pub version: f64,
    pub size: u64,
    pub description: String,
    pub directory: PathBuf,
    /// Namespacing prefix for drivers sharing a flat keyspace.
    pub key_prefix: String,
    pub codec: Arc<dyn Codec>,
    /// Backend connection, downcast by the owning driver.
    pub handle: Arc<dyn Any + Send + Sync>,
}

impl DbInfo {
    /// Echo a config into a binding with the given backend handle.
    pub fn from_config(
        config: &Config,
        codec: Arc<dyn Codec>,
        handle: Arc<dyn Any + Send + Sync>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            store_name: config.store_name.clone(),
            version: config.version,
            size: config.size,
            description: config.description.clone(),
            directory: config.directory.clone(),
            key_prefix: config.key_prefix(),
            codec,
            handle,
        }
    }
}

impl fmt::Debug for DbInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbInfo")
            .field("name", &self.name)
            .field("store_name", &self.store_name)
            .field("version", &self.version)
            .field("size", &self.size)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

/// What `drop_instance` should remove. With no name, the facade fills
/// in the current binding's name and store name. A name without a
/// store name drops every store under that name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DropTarget {
    pub name: Option<String>,
    pub store_name: Option<String>,
}

/// Visitor handed to `iterate`: receives each decoded value, its key,
/// and a 1-based ordinal. Returning `Some` short-circuits iteration
/// and becomes the overall result.
pub type IterateVisitor<'a> = dyn FnMut(Value, &str, u64) -> Option<Value> + Send + 'a;

/// A storage backend behind the facade.
///
/// `init_storage` must be safe to call again after a prior failure and
/// must build the `DbInfo` (including the codec) before returning.
/// All other methods receive the binding's `DbInfo` by reference.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn init_storage(
        &self,
        config: &Config,
        codec: Arc<dyn Codec>,
    ) -> Result<DbInfo, StoreError>;

    /// Fetch a value; missing keys resolve to `Value::Null`.
    async fn get_item(&self, db: &DbInfo, key: &str) -> Result<Value, StoreError>;

    /// Store a value and echo the canonicalized stored value back.
    async fn set_item(&self, db: &DbInfo, key: &str, value: Value) -> Result<Value, StoreError>;

    async fn remove_item(&self, db: &DbInfo, key: &str) -> Result<(), StoreError>;

    async fn clear(&self, db: &DbInfo) -> Result<(), StoreError>;

    async fn length(&self, db: &DbInfo) -> Result<usize, StoreError>;

    /// The key at `index` in backend-native order, if any.
    async fn key(&self, db: &DbInfo, index: usize) -> Result<Option<String>, StoreError>;

    async fn keys(&self, db: &DbInfo) -> Result<Vec<String>, StoreError>;

    /// Visit entries in backend-native order, stopping early on the
    /// visitor's first `Some`.
    async fn iterate(
        &self,
        db: &DbInfo,
        visitor: &mut IterateVisitor,
    ) -> Result<Option<Value>, StoreError>;

    /// Optional: drivers that support it declare `Method::DropInstance`
    /// in [`Driver::provided`]. The facade synthesizes the rejection
    /// for drivers that do not, so this default body is a safety net.
    async fn drop_instance(&self, db: &DbInfo, target: &DropTarget) -> Result<(), StoreError> {
        let _ = (db, target);
        Err(StoreError::DropInstanceNotImplemented)
    }

    /// Methods this driver actually implements; validated once at
    /// registration.
    fn provided(&self) -> MethodSet {
        MethodSet::required()
    }

    /// Bounded internal retry budget for quota failures.
    fn quota_retry_attempts(&self) -> u32 {
        1
    }
}

/// Retry `op` after a quota failure, at most `attempts` times.
/// Non-quota errors and successes pass through untouched.
pub(crate) async fn with_quota_retry<T, F, Fut>(attempts: u32, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut remaining = attempts;
    loop {
        match op().await {
            Err(StoreError::QuotaExceeded(message)) if remaining > 0 => {
                remaining -= 1;
                debug!(%message, remaining, "quota exceeded, retrying write");
            }
            other => return other,
        }
    }
}
