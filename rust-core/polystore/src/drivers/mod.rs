// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Built-in drivers. Concrete backends live here; everything above this
// module sees them only through the `Driver` contract.

pub mod memory;

#[cfg(feature = "redb-driver")]
pub mod redb_backend;

pub use memory::MemoryDriver;

#[cfg(feature = "redb-driver")]
pub use redb_backend::RedbDriver;
