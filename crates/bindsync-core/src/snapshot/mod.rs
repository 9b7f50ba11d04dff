// # Reconciliation Snapshots
//
// The snapshot records what the last successful reconfiguration was built
// from. It is read at the start of each pass and overwritten before each
// commit.

pub mod file;
pub mod memory;

pub use file::FileSnapshotStore;
pub use memory::MemorySnapshotStore;

use crate::aggregate::ZoneSet;
use crate::config::{StateStoreConfig, ZoneConfig};
use crate::topology::ClusterTopology;
use crate::traits::SnapshotStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;

/// Snapshot format version
pub const SNAPSHOT_VERSION: &str = "1.0";

/// Last applied reconciliation state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSnapshot {
    #[serde(default = "default_version")]
    pub version: String,

    /// When the snapshot was taken
    pub written_at: DateTime<Utc>,

    /// Zones as rendered (conflicting entries already removed)
    pub zones: ZoneSet,

    pub topology: Option<ClusterTopology>,

    #[serde(default)]
    pub secondary_transfer_ips: BTreeSet<IpAddr>,

    /// Rendering settings the files were generated with
    #[serde(default)]
    pub settings: Option<ZoneConfig>,
}

impl ReconciliationSnapshot {
    pub fn new(
        zones: ZoneSet,
        topology: Option<ClusterTopology>,
        secondary_transfer_ips: BTreeSet<IpAddr>,
    ) -> Self {
        Self {
            version: default_version(),
            written_at: Utc::now(),
            zones,
            topology,
            secondary_transfer_ips,
            settings: None,
        }
    }

    pub fn with_settings(mut self, settings: ZoneConfig) -> Self {
        self.settings = Some(settings);
        self
    }
}

fn default_version() -> String {
    SNAPSHOT_VERSION.to_string()
}

/// Open the snapshot store described by `config`
pub async fn open(config: &StateStoreConfig) -> Result<Box<dyn SnapshotStore>, crate::Error> {
    match config {
        StateStoreConfig::File { path } => Ok(Box::new(FileSnapshotStore::new(path).await?)),
        StateStoreConfig::Memory => Ok(Box::new(MemorySnapshotStore::new())),
    }
}
