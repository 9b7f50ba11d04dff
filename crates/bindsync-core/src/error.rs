//! Error types for bindsync
//!
//! Only boundary failures (topology, disk, process control) are errors.
//! Per-request validation failures and record conflicts are carried as data
//! in the pass report, see [`crate::model::ValidationError`] and
//! [`crate::conflict::Resolution`].

use thiserror::Error;

/// Result type alias for bindsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for bindsync
#[derive(Error, Debug)]
pub enum Error {
    /// The peer group or the unit's network binding could not be read.
    /// The pass is abandoned before anything is written.
    #[error("Topology unavailable: {0}")]
    TopologyUnavailable(String),

    /// Snapshot store errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Staging or committing generated configuration failed
    #[error("Write error: {0}")]
    Write(String),

    /// The name server could not be reloaded or started
    #[error("Reload error: {0}")]
    Reload(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

}

impl Error {
    /// Create a topology-unavailable error
    pub fn topology(msg: impl Into<String>) -> Self {
        Self::TopologyUnavailable(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a write error
    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }

    /// Create a reload error
    pub fn reload(msg: impl Into<String>) -> Self {
        Self::Reload(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error happened after the snapshot was persisted and
    /// therefore needs operator attention instead of waiting for the next
    /// trigger.
    pub fn is_commit_failure(&self) -> bool {
        matches!(self, Self::Write(_) | Self::Reload(_))
    }
}
