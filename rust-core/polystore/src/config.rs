// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-instance configuration for the polystore facade.
//
// Each facade instance owns one `Config`. It is mutable only until the
// first storage operation locks the instance; the facade enforces the
// lock, this module only defines the data and its validation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;

/// Fixed message for a JSON-sourced `version` that is not a number.
pub(crate) const VERSION_NOT_A_NUMBER: &str = "Database version must be a number.";

/// Default instance name, also the default database file stem for
/// file-backed drivers.
pub const DEFAULT_NAME: &str = "polystore";
/// Default store name within an instance.
pub const DEFAULT_STORE_NAME: &str = "keyvaluepairs";
/// Default size hint in bytes, honored by drivers with a quota notion.
pub const DEFAULT_SIZE: u64 = 4_980_736;

/// The configuration of one facade instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Driver preference order used when no call-scoped order is given.
    pub driver_order: Vec<String>,
    pub name: String,
    /// Sanitized to `[A-Za-z0-9_]` on assignment.
    pub store_name: String,
    pub version: f64,
    /// Byte budget for drivers that enforce a quota.
    pub size: u64,
    pub description: String,
    /// Directory for file-backed drivers.
    pub directory: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            driver_order: default_driver_order(),
            name: DEFAULT_NAME.to_string(),
            store_name: DEFAULT_STORE_NAME.to_string(),
            version: 1.0,
            size: DEFAULT_SIZE,
            description: String::new(),
            directory: std::env::temp_dir(),
        }
    }
}

/// The built-in preference order: persistent first, memory fallback.
pub fn default_driver_order() -> Vec<String> {
    let mut order = Vec::new();
    #[cfg(feature = "redb-driver")]
    order.push(crate::REDB_DRIVER.to_string());
    order.push(crate::MEMORY_DRIVER.to_string());
    order
}

impl Config {
    /// Key prefix for drivers that namespace a shared flat keyspace:
    /// `"{name}/"`, extended with `"{store_name}/"` only when the store
    /// name differs from the default.
    pub fn key_prefix(&self) -> String {
        prefix_for(&self.name, &self.store_name)
    }

    /// Fold a set of partial options into this config.
    pub(crate) fn apply(&mut self, options: ConfigOptions) {
        if let Some(driver) = options.driver {
            self.driver_order = driver;
        }
        if let Some(name) = options.name {
            self.name = name;
        }
        if let Some(store_name) = options.store_name {
            let sanitized = sanitize_store_name(&store_name);
            if sanitized != store_name {
                warn!(
                    requested = %store_name,
                    applied = %sanitized,
                    "store name contained invalid characters and was sanitized"
                );
            }
            self.store_name = sanitized;
        }
        if let Some(version) = options.version {
            self.version = version;
        }
        if let Some(size) = options.size {
            self.size = size;
        }
        if let Some(description) = options.description {
            self.description = description;
        }
        if let Some(directory) = options.directory {
            self.directory = directory;
        }
    }
}

/// Compute the namespacing prefix for a (name, store name) pair.
pub(crate) fn prefix_for(name: &str, store_name: &str) -> String {
    if store_name == DEFAULT_STORE_NAME {
        format!("{name}/")
    } else {
        format!("{name}/{store_name}/")
    }
}

/// Restrict a store name to alphanumerics and underscores, mapping
/// every other character to `_`.
pub fn sanitize_store_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// A partial configuration update. Unset fields leave the current
/// value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigOptions {
    /// Replacement driver preference order.
    pub driver: Option<Vec<String>>,
    pub name: Option<String>,
    pub store_name: Option<String>,
    pub version: Option<f64>,
    pub size: Option<u64>,
    pub description: Option<String>,
    pub directory: Option<PathBuf>,
}

impl ConfigOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn driver<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.driver = Some(order.into_iter().map(Into::into).collect());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn store_name(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = Some(store_name.into());
        self
    }

    pub fn version(mut self, version: f64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Parse options from JSON, e.g. a config file. A `version` that
    /// is present but not a JSON number is rejected with the fixed
    /// message consumers match on.
    pub fn from_value(value: serde_json::Value) -> Result<Self, StoreError> {
        if let Some(version) = value.get("version") {
            if !version.is_number() {
                return Err(StoreError::InvalidConfig(VERSION_NOT_A_NUMBER.into()));
            }
        }
        serde_json::from_value(value).map_err(|err| StoreError::InvalidConfig(err.to_string()))
    }
}
