// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Error taxonomy for the polystore facade.
//
// One unified enum covers configuration misuse, driver negotiation
// failures, codec failures, quota conditions, and opaque backend
// errors. Several messages are fixed, externally observable strings
// that existing consumers match on; they must not be reworded.

use thiserror::Error;

/// Errors surfaced by the facade, the readiness engine, and drivers.
///
/// The enum is `Clone` so a failed readiness generation can hand its
/// terminal error to every later caller; backend errors therefore
/// carry their message as a string rather than the source error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No registered, supported driver could be initialized for the
    /// current generation.
    #[error("No available storage method found.")]
    NoAvailableDriver,

    /// Configuration was mutated after the first storage operation
    /// locked the instance.
    #[error("Can't call config() after localforage has been used.")]
    ConfigLocked,

    /// A configuration field failed validation. The payload is the
    /// field-specific message, itself a fixed string.
    #[error("{0}")]
    InvalidConfig(String),

    /// A driver descriptor failed structural validation at
    /// registration time.
    #[error("Custom driver not compliant; see https://mozilla.github.io/localForage/#definedriver")]
    DriverNotCompliant,

    /// The active driver does not implement `drop_instance`.
    #[error("Method dropInstance is not implemented by the current driver")]
    DropInstanceNotImplemented,

    /// A value could not be encoded or decoded by the codec.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend refused a write for lack of space.
    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// An opaque, backend-specific failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Wrap any displayable backend failure as an opaque error.
    pub(crate) fn backend(err: impl std::fmt::Display) -> Self {
        StoreError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_available_driver_message_is_fixed() {
        assert_eq!(
            StoreError::NoAvailableDriver.to_string(),
            "No available storage method found."
        );
    }

    #[test]
    fn test_config_locked_message_is_fixed() {
        assert_eq!(
            StoreError::ConfigLocked.to_string(),
            "Can't call config() after localforage has been used."
        );
    }

    #[test]
    fn test_driver_not_compliant_message_is_fixed() {
        assert_eq!(
            StoreError::DriverNotCompliant.to_string(),
            "Custom driver not compliant; see https://mozilla.github.io/localForage/#definedriver"
        );
    }

    #[test]
    fn test_drop_instance_message_is_fixed() {
        assert_eq!(
            StoreError::DropInstanceNotImplemented.to_string(),
            "Method dropInstance is not implemented by the current driver"
        );
    }

    #[test]
    fn test_invalid_config_passes_message_through() {
        let err = StoreError::InvalidConfig("Database version must be a number.".into());
        assert_eq!(err.to_string(), "Database version must be a number.");
    }

    #[test]
    fn test_backend_error_display() {
        let err = StoreError::backend("connection refused");
        assert_eq!(err.to_string(), "backend error: connection refused");
    }

    #[test]
    fn test_errors_are_cloneable() {
        let err = StoreError::QuotaExceeded("128 bytes over".into());
        assert_eq!(err.clone(), err);
    }
}
