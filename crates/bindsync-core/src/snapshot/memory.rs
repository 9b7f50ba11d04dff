// # Memory Snapshot Store
//
// In-memory implementation of SnapshotStore.
//
// Nothing survives a restart: the first pass after a restart always
// regenerates and reloads. Useful for tests and for deployments where an
// extra reload at startup is harmless.

use std::sync::Arc;
use tokio::sync::RwLock;
use async_trait::async_trait;

use super::ReconciliationSnapshot;
use crate::traits::SnapshotStore;
use crate::Error;

/// In-memory snapshot store
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    inner: Arc<RwLock<Option<ReconciliationSnapshot>>>,
}

impl MemorySnapshotStore {
    /// Create a new empty memory snapshot store
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the store holds no snapshot
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_none()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Result<Option<ReconciliationSnapshot>, Error> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, snapshot: &ReconciliationSnapshot) -> Result<(), Error> {
        *self.inner.write().await = Some(snapshot.clone());
        Ok(())
    }
}
