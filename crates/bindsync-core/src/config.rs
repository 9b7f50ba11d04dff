//! Configuration types for bindsync
//!
//! Everything an operator can tune lives here: how zones are rendered, where
//! the live configuration goes, where the last applied snapshot is kept and
//! a few engine knobs.

use crate::model::validate_host_label;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Default live configuration directory
pub const DEFAULT_CONFIG_DIR: &str = "/etc/bind";

/// Main bindsync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindSyncConfig {
    /// Zone rendering settings
    pub zone: ZoneConfig,

    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Snapshot store configuration
    #[serde(default)]
    pub state_store: StateStoreConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl BindSyncConfig {
    /// Create a configuration with defaults and the given SOA mailbox
    pub fn new(mailbox: impl Into<String>) -> Self {
        Self {
            zone: ZoneConfig::new(mailbox),
            paths: PathsConfig::default(),
            state_store: StateStoreConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.zone.validate()?;
        self.paths.validate()?;
        self.state_store.validate()?;

        if self.engine.event_channel_capacity == 0 {
            return Err(crate::Error::config(
                "Event channel capacity must be > 0",
            ));
        }

        Ok(())
    }
}

/// Zone rendering settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Local part of the SOA responsible-person address
    ///
    /// Rendered as `<mailbox>.<zone>.` so it must be a single label.
    pub mailbox: String,

    /// Nameserver host labels published in every zone
    ///
    /// Empty means a single `ns` label.
    #[serde(default)]
    pub names: Vec<String>,

    /// Public addresses published as nameservers instead of the standby
    /// units' addresses
    #[serde(default)]
    pub public_ips: Vec<IpAddr>,

    /// Secondary servers outside the cluster allowed to transfer zones
    #[serde(default)]
    pub secondary_transfer_ips: Vec<IpAddr>,

    /// Zone-wide `$TTL`
    #[serde(default = "default_zone_ttl")]
    pub default_ttl: u32,

    /// Include `zones.rfc1918` at the top of `named.conf.local`
    #[serde(default = "default_include_rfc1918")]
    pub include_rfc1918: bool,
}

impl ZoneConfig {
    pub fn new(mailbox: impl Into<String>) -> Self {
        Self {
            mailbox: mailbox.into(),
            names: Vec::new(),
            public_ips: Vec::new(),
            secondary_transfer_ips: Vec::new(),
            default_ttl: default_zone_ttl(),
            include_rfc1918: default_include_rfc1918(),
        }
    }

    /// Set the nameserver names
    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the public nameserver addresses
    pub fn with_public_ips(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.public_ips = ips.into_iter().collect();
        self
    }

    /// Set the extra secondary-transfer allowlist
    pub fn with_secondary_transfer_ips(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.secondary_transfer_ips = ips.into_iter().collect();
        self
    }

    /// Nameserver names to render, falling back to `ns`
    pub fn nameserver_names(&self) -> Vec<String> {
        if self.names.is_empty() {
            vec![DEFAULT_NAMESERVER_NAME.to_string()]
        } else {
            self.names.clone()
        }
    }

    /// Validate the zone settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_mailbox(&self.mailbox)?;

        for name in &self.names {
            if name == "@" || name.starts_with('*') {
                return Err(crate::Error::config(format!(
                    "Invalid nameserver name {:?}: must be a plain host label",
                    name
                )));
            }
            validate_host_label(name).map_err(|e| {
                crate::Error::config(format!("Invalid nameserver name {:?}: {}", name, e))
            })?;
        }

        if self.default_ttl == 0 {
            return Err(crate::Error::config("Zone default TTL must be > 0"));
        }

        Ok(())
    }
}

/// Host label used for nameservers when none are configured
pub const DEFAULT_NAMESERVER_NAME: &str = "ns";

/// Check an SOA mailbox
///
/// The mailbox must be non-empty and free of ASCII punctuation and
/// whitespace.
pub fn validate_mailbox(mailbox: &str) -> Result<(), crate::Error> {
    let trimmed = mailbox.trim();
    if trimmed.is_empty() {
        return Err(crate::Error::config("Mailbox cannot be empty"));
    }

    if let Some(c) = mailbox
        .chars()
        .find(|c| c.is_ascii_punctuation() || c.is_whitespace())
    {
        return Err(crate::Error::config(format!(
            "Mailbox {:?} contains forbidden character {:?}",
            mailbox, c
        )));
    }

    Ok(())
}

/// Filesystem locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Live name-server configuration directory
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Where staging directories are created
    ///
    /// Defaults to the system temporary directory. Put it on the same
    /// filesystem as `config_dir` to get a plain rename per file.
    #[serde(default)]
    pub staging_root: Option<PathBuf>,
}

impl PathsConfig {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            staging_root: None,
        }
    }

    /// Validate the paths
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.config_dir.as_os_str().is_empty() {
            return Err(crate::Error::config("Config directory cannot be empty"));
        }
        if !self.config_dir.is_absolute() {
            return Err(crate::Error::config(format!(
                "Config directory must be absolute: {}",
                self.config_dir.display()
            )));
        }
        Ok(())
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self::new(default_config_dir())
    }
}

/// Snapshot store configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based snapshot store
    File {
        /// Path to the snapshot file
        path: PathBuf,
    },

    /// In-memory snapshot store (not persistent)
    #[default]
    Memory,
}

impl StateStoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StateStoreConfig::File { path } if path.as_os_str().is_empty() => Err(
                crate::Error::config("Snapshot file path cannot be empty"),
            ),
            _ => Ok(()),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log). A pass never
    /// waits on a slow event consumer.
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_zone_ttl() -> u32 {
    600
}

fn default_include_rfc1918() -> bool {
    true
}

fn default_config_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_DIR)
}

fn default_event_channel_capacity() -> usize {
    1000
}
