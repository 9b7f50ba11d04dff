//! Collaborator traits for bindsync
//!
//! The engine only talks to the outside world through these interfaces.
//!
//! - [`SnapshotStore`]: last applied state, for change detection
//! - [`Reloader`]: name-server process control
//! - [`PeerRegistry`]: raw peer group data used to compute the topology

pub mod peer_registry;
pub mod reloader;
pub mod snapshot_store;

pub use peer_registry::PeerRegistry;
pub use reloader::{ReloadOutcome, Reloader};
pub use snapshot_store::SnapshotStore;
