// # File Snapshot Store
//
// File-based implementation of SnapshotStore.
//
// ## Crash Behaviour
//
// - Atomic writes: the new snapshot is written to a temporary file next to
//   the target, flushed, then renamed over it
// - Corruption: a snapshot that fails to parse is ignored with a warning and
//   the next pass regenerates everything
//
// There is deliberately no backup file to fall back on. The snapshot is
// written before the configuration it describes, so an older snapshot may
// not match what is live; regenerating is the only safe recovery.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "written_at": "2025-01-09T12:00:00Z",
//   "zones": { "dns.test": { "domain": "dns.test", "entries": [ ... ] } },
//   "topology": { "units_ip": ["1.1.1.1"], ... },
//   "secondary_transfer_ips": [],
//   "settings": { "mailbox": "hostmaster", "names": [], ... }
// }
// ```

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{ReconciliationSnapshot, SNAPSHOT_VERSION};
use crate::Error;
use crate::traits::SnapshotStore;

/// File-based snapshot store
///
/// # Example
///
/// ```rust,no_run
/// use bindsync_core::snapshot::FileSnapshotStore;
/// use bindsync_core::traits::SnapshotStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileSnapshotStore::new("/var/lib/bindsync/state.json").await?;
///
///     if store.load().await?.is_none() {
///         println!("no snapshot yet, the next pass regenerates everything");
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    /// Create a file snapshot store, creating the parent directory if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create snapshot directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self) -> Result<Option<ReconciliationSnapshot>, Error> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("Snapshot file does not exist: {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::state_store(format!(
                    "Failed to read snapshot file {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let snapshot: ReconciliationSnapshot = match serde_json::from_str(&content) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(
                    "Snapshot file {} appears corrupted: {}. Ignoring it.",
                    self.path.display(),
                    e
                );
                return Ok(None);
            }
        };

        if snapshot.version != SNAPSHOT_VERSION {
            tracing::warn!(
                "Snapshot version mismatch: expected {}, got {}. Ignoring it.",
                SNAPSHOT_VERSION,
                snapshot.version
            );
            return Ok(None);
        }

        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &ReconciliationSnapshot) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| Error::state_store(format!("Failed to serialize snapshot: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Snapshot written to file: {}", self.path.display());
        Ok(())
    }
}
