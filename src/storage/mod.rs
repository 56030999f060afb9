//! # Row Store
//!
//! The engine treats persistent storage as an external collaborator: a
//! transactional, tenant-partitioned key/row store it issues operations
//! against. `RowStore` is that seam; `MemoryStore` is the in-process
//! implementation used by the server and the test suites.
//!
//! Writes are expressed as [`StoreOp`] batches applied through
//! [`RowStore::apply`], which is all-or-nothing: either every operation in
//! the batch takes effect or none does. Schema provisioning and metadata
//! writes ride in the same batch so a failure can never leave a half-built
//! table behind.

mod memory;

pub use memory::MemoryStore;

use serde_json::Value;

use crate::error::EngineResult;

/// One write operation against the store.
#[derive(Debug, Clone)]
pub enum StoreOp {
    /// Provision physical storage for a space. Idempotent.
    Provision { space: String },

    /// Drop a space and all rows in it.
    Drop { space: String },

    /// Insert a new row; fails with a conflict if the id already exists.
    Insert {
        space: String,
        tenant: String,
        id: String,
        row: Value,
    },

    /// Replace or create a row.
    Put {
        space: String,
        tenant: String,
        id: String,
        row: Value,
    },

    /// Remove a row.
    Remove {
        space: String,
        tenant: String,
        id: String,
    },
}

/// Transactional, tenant-partitioned key/row store.
///
/// Uniqueness constraints are enforced here, not by application-level
/// locks: concurrent writers racing on the same unique value are resolved
/// by the store rejecting the loser with a conflict.
pub trait RowStore: Send + Sync {
    /// Whether a space has been provisioned.
    fn space_exists(&self, space: &str) -> bool;

    /// Declare a unique index on a field of a space. Rows violating it are
    /// rejected at write time, scoped per tenant.
    fn declare_unique(&self, space: &str, field: &str);

    /// Retract a unique index.
    fn retract_unique(&self, space: &str, field: &str);

    /// Fetch a single row.
    fn get(&self, space: &str, tenant: &str, id: &str) -> Option<Value>;

    /// All rows of one tenant in a space, in stable id order.
    fn scan(&self, space: &str, tenant: &str) -> Vec<Value>;

    /// All rows of a space across tenants, as (tenant, row) pairs.
    fn scan_all(&self, space: &str) -> Vec<(String, Value)>;

    /// Apply a batch of operations atomically.
    fn apply(&self, ops: Vec<StoreOp>) -> EngineResult<()>;
}
