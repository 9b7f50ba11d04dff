// # bindsync-core
//
// Core library reconciling requested DNS records into a BIND deployment
// replicated across a cluster of units.
//
// ## Architecture Overview
//
// - **model**: validated record entries and zones
// - **aggregate**: merges every requester's asks into zones
// - **conflict**: splits entries into non-conflicting and conflicting sets
// - **topology**: active/standby view of the cluster
// - **change**: compares the desired state with the last applied snapshot
// - **compile**: renders zone files and `named.conf.local`
// - **staging**: commits generated files through a staging directory
// - **engine**: ReconcileEngine, orchestrating one pass per trigger
//
// Collaborators (snapshot storage, peer registry, name-server process
// control) are traits in [`traits`] so the engine can run against test
// doubles.
//
// ## Design Principles
//
// 1. **Pure core**: aggregation, conflict resolution, change detection and
//    compilation do no I/O
// 2. **Conflicts are data**: a conflict degrades a pass, it never aborts it
// 3. **Idempotency**: an unchanged state never reloads the name server
// 4. **At-least-once convergence**: the snapshot is persisted before the
//    configuration it describes

pub mod aggregate;
pub mod change;
pub mod compile;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod model;
pub mod registry;
pub mod snapshot;
pub mod staging;
pub mod topology;
pub mod traits;

// Re-export core types for convenience
pub use config::{BindSyncConfig, EngineConfig, PathsConfig, StateStoreConfig, ZoneConfig};
pub use engine::{EngineEvent, PassOutcome, PassReport, ReconcileEngine, ReconcileRequest};
pub use error::{Error, Result};
pub use model::{DnsRecordEntry, RecordRequest, RequesterSubmission, Zone};
pub use registry::{FilePeerRegistry, StaticPeerRegistry};
pub use snapshot::{FileSnapshotStore, MemorySnapshotStore, ReconciliationSnapshot};
pub use topology::{ClusterTopology, PeerView};
pub use traits::{PeerRegistry, ReloadOutcome, Reloader, SnapshotStore};
