// # Snapshot Store Trait
//
// Defines the interface for persisting the last applied reconciliation
// snapshot.
//
// ## Purpose
//
// The snapshot is the only state bindsync keeps between passes. It is
// written *before* the generated configuration is committed, so a crash
// halfway through a commit leaves the next pass still aiming at the
// intended state.
//
// ## Implementations
//
// - File-based: versioned JSON document, see [`crate::snapshot::FileSnapshotStore`]
// - In-memory: [`crate::snapshot::MemorySnapshotStore`]

use crate::snapshot::ReconciliationSnapshot;
use async_trait::async_trait;

/// Trait for snapshot store implementations
///
/// A store is an injected key-value slot holding at most one snapshot.
///
/// # Failure semantics
///
/// `load()` fails open: implementations should return `Ok(None)` for a
/// missing or corrupt snapshot. The engine treats any `Err` from `load()`
/// the same way, as "always changed".
///
/// `save()` errors abort the pass before any configuration is written.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the last persisted snapshot
    ///
    /// # Returns
    ///
    /// - `Ok(Some(snapshot))`: A snapshot was found
    /// - `Ok(None)`: No usable snapshot
    /// - `Err(Error)`: Storage error
    async fn load(&self) -> Result<Option<ReconciliationSnapshot>, crate::Error>;

    /// Replace the persisted snapshot
    async fn save(&self, snapshot: &ReconciliationSnapshot) -> Result<(), crate::Error>;
}
