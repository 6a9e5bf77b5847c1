// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! antfarm-storage: the persistent transactional Store.
//!
//! A write-ahead log of row-level [`StoreOp`]s is replayed into a
//! [`MaterializedState`]. All mutation happens through [`Store::with_transaction`],
//! a unit-of-work that only durably commits once its closure returns `Ok`.

mod error;
mod migration;
mod op;
mod snapshot;
mod state;
mod store;
mod wal;

pub use error::{StoreError, WalError};
pub use migration::{Migration, MigrationError, MigrationRegistry, CURRENT_STATE_VERSION};
pub use op::StoreOp;
pub use snapshot::Snapshot;
pub use state::MaterializedState;
pub use store::{Store, Transaction};
pub use wal::{Wal, WalEntry};
