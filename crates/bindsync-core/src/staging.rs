// # Staged Writer
//
// Commits a compiled configuration set to the live configuration directory.
//
// ## Procedure
//
// 1. Every file is written into a fresh staging directory. A failure here
//    leaves the live directory untouched.
// 2. Each staged file is moved over its live counterpart on its own. A
//    rename never exposes a half-written file; a crash between two moves
//    leaves some files from the new set and some from the old one.
//
// When the staging directory sits on another filesystem the rename fails
// with `CrossesDevices`. The file is then copied next to its target and
// renamed from there, which keeps each individual replacement atomic.

use crate::compile::CompiledConfig;
use crate::config::PathsConfig;
use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Writes compiled configuration through a staging directory
#[derive(Debug, Clone)]
pub struct StagedWriter {
    config_dir: PathBuf,
    staging_root: Option<PathBuf>,
}

impl StagedWriter {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            staging_root: None,
        }
    }

    pub fn from_paths(paths: &PathsConfig) -> Self {
        Self {
            config_dir: paths.config_dir.clone(),
            staging_root: paths.staging_root.clone(),
        }
    }

    /// Create staging directories under `root` instead of the system
    /// temporary directory
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Stage and commit every file of `compiled`
    ///
    /// # Returns
    ///
    /// - `Ok(paths)`: Live paths of the committed files, in file name order
    /// - `Err(Error::Write)`: Staging or moving failed. Files moved before
    ///   the failure stay in place.
    pub async fn commit(&self, compiled: &CompiledConfig) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.config_dir).await.map_err(|e| {
            Error::write(format!(
                "Failed to create config directory {}: {}",
                self.config_dir.display(),
                e
            ))
        })?;

        let staging = self.staging_dir()?;
        tracing::trace!("Staging {} files in {}", compiled.len(), staging.path().display());

        for (name, content) in compiled.files() {
            let staged = staging.path().join(name);
            fs::write(&staged, content).await.map_err(|e| {
                Error::write(format!("Failed to stage {}: {}", staged.display(), e))
            })?;
        }

        let mut committed = Vec::with_capacity(compiled.len());
        for name in compiled.file_names() {
            let staged = staging.path().join(name);
            let live = self.config_dir.join(name);
            move_into_place(&staged, &live).await.map_err(|e| {
                Error::write(format!(
                    "Failed to move {} into {} after committing {} files: {}",
                    name,
                    self.config_dir.display(),
                    committed.len(),
                    e
                ))
            })?;
            committed.push(live);
        }

        tracing::debug!(
            "Committed {} files to {}",
            committed.len(),
            self.config_dir.display()
        );

        Ok(committed)
    }

    fn staging_dir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(".bindsync-staging-");

        let staging = match &self.staging_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };

        staging.map_err(|e| Error::write(format!("Failed to create staging directory: {}", e)))
    }
}

async fn move_into_place(staged: &Path, live: &Path) -> std::io::Result<()> {
    match fs::rename(staged, live).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            tracing::trace!(
                "{} is on another filesystem, copying instead",
                staged.display()
            );
            replace_by_copy(staged, live).await
        }
        Err(e) => Err(e),
    }
}

/// Copy `staged` next to `live`, then rename it over `live`
async fn replace_by_copy(staged: &Path, live: &Path) -> std::io::Result<()> {
    let mut temp = live.as_os_str().to_owned();
    temp.push(".bindsync-tmp");
    let temp = PathBuf::from(temp);

    fs::copy(staged, &temp).await?;
    if let Err(e) = fs::rename(&temp, live).await {
        let _ = fs::remove_file(&temp).await;
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ZoneSet;
    use crate::compile::{CompileContext, Serial, compile};
    use crate::config::ZoneConfig;
    use crate::topology::ClusterTopology;
    use std::collections::BTreeSet;
    use std::net::IpAddr;
    use tempfile::tempdir;

    fn compiled() -> CompiledConfig {
        let ip: IpAddr = "1.1.1.1".parse().unwrap();
        let topology = ClusterTopology::new([ip], Some(ip), ip);
        let settings = ZoneConfig::new("mail");
        let transfer = BTreeSet::new();
        let ctx = CompileContext {
            topology: &topology,
            settings: &settings,
            secondary_transfer_ips: &transfer,
            config_dir: Path::new("/etc/bind"),
            serial: Serial::from(1),
        };
        compile(&ZoneSet::new(), &ctx)
    }

    #[tokio::test]
    async fn test_commit_writes_every_file() {
        let live = tempdir().unwrap();
        let staging_root = tempdir().unwrap();
        let writer = StagedWriter::new(live.path()).with_staging_root(staging_root.path());

        let compiled = compiled();
        let written = writer.commit(&compiled).await.unwrap();
        assert_eq!(written.len(), compiled.len());

        for (name, content) in compiled.files() {
            let on_disk = fs::read_to_string(live.path().join(name)).await.unwrap();
            assert_eq!(&on_disk, content);
        }

        // The staging directory is gone once the commit returns
        let mut leftovers = fs::read_dir(staging_root.path()).await.unwrap();
        assert!(leftovers.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_replaces_existing_files() {
        let live = tempdir().unwrap();
        fs::write(live.path().join("named.conf.local"), "stale").await.unwrap();
        fs::write(live.path().join("unrelated.conf"), "keep").await.unwrap();

        StagedWriter::new(live.path())
            .with_staging_root(live.path())
            .commit(&compiled())
            .await
            .unwrap();

        let conf = fs::read_to_string(live.path().join("named.conf.local")).await.unwrap();
        assert_ne!(conf, "stale");
        let unrelated = fs::read_to_string(live.path().join("unrelated.conf")).await.unwrap();
        assert_eq!(unrelated, "keep");
    }

    #[tokio::test]
    async fn test_commit_creates_config_dir() {
        let root = tempdir().unwrap();
        let config_dir = root.path().join("etc").join("bind");

        StagedWriter::new(&config_dir).commit(&compiled()).await.unwrap();
        assert!(config_dir.join("db.service.test").exists());
    }

    #[tokio::test]
    async fn test_commit_failure_is_write_error() {
        let root = tempdir().unwrap();
        let not_a_dir = root.path().join("file");
        fs::write(&not_a_dir, "x").await.unwrap();

        let result = StagedWriter::new(&not_a_dir).commit(&compiled()).await;
        assert!(matches!(result, Err(Error::Write(_))));
    }

    #[tokio::test]
    async fn test_missing_staging_root_leaves_live_dir_untouched() {
        let live = tempdir().unwrap();
        let writer = StagedWriter::new(live.path())
            .with_staging_root(live.path().join("does-not-exist"));

        let result = writer.commit(&compiled()).await;
        assert!(matches!(result, Err(Error::Write(_))));

        let mut entries = fs::read_dir(live.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_by_copy() {
        let dir = tempdir().unwrap();
        let staged = dir.path().join("staged");
        let live = dir.path().join("live");
        fs::write(&staged, "new").await.unwrap();
        fs::write(&live, "old").await.unwrap();

        replace_by_copy(&staged, &live).await.unwrap();
        assert_eq!(fs::read_to_string(&live).await.unwrap(), "new");
        assert!(!dir.path().join("live.bindsync-tmp").exists());
    }
}
