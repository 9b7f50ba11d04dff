//! Peer registry implementations
//!
//! - [`StaticPeerRegistry`]: in-memory peer group, updated by whoever
//!   observes peer and leadership events
//! - [`FilePeerRegistry`]: peer group published as a JSON [`PeerView`]
//!   document by an external agent

use crate::error::{Error, Result};
use crate::topology::PeerView;
use crate::traits::PeerRegistry;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;

/// In-memory peer registry
///
/// Starts empty, in which case [`PeerRegistry::peer_view`] reports the
/// topology as unavailable.
#[derive(Debug, Clone, Default)]
pub struct StaticPeerRegistry {
    inner: Arc<RwLock<Option<PeerView>>>,
}

impl StaticPeerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that already holds a peer group
    pub fn with_view(view: PeerView) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(view))),
        }
    }

    /// Replace the peer group
    pub async fn set(&self, view: PeerView) {
        *self.inner.write().await = Some(view);
    }

    /// Forget the peer group
    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

#[async_trait]
impl PeerRegistry for StaticPeerRegistry {
    async fn peer_view(&self) -> Result<PeerView> {
        self.inner
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::topology("peer group not established"))
    }
}

/// Peer registry backed by a JSON file
#[derive(Debug, Clone)]
pub struct FilePeerRegistry {
    path: PathBuf,
}

impl FilePeerRegistry {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PeerRegistry for FilePeerRegistry {
    async fn peer_view(&self) -> Result<PeerView> {
        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            Error::topology(format!(
                "failed to read peer registry {}: {}",
                self.path.display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            Error::topology(format!(
                "failed to parse peer registry {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}
