//! Reconciliation engine
//!
//! The ReconcileEngine runs one reconciliation pass per external trigger:
//! - Computing the cluster topology from the peer registry
//! - Aggregating requester submissions and resolving conflicts
//! - Checking the last applied snapshot for idempotency
//! - Persisting the new snapshot, then committing the compiled files
//! - Reloading the name server if it is running
//!
//! ## Architecture
//!
//! ```text
//!   submissions        ┌──────────────┐
//! ───────────────────▶ │ ReconcileEng │ ◀── PeerRegistry (topology)
//!                      └──────────────┘
//!                             │
//!         ┌───────────────────┼───────────────────┬──────────────────┐
//!         ▼                   ▼                   ▼                  ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │SnapshotStore │   │ StagedWriter │   │   Reloader   │   │    Events    │
//! │ (diff, save) │   │ (commit)     │   │ (reload)     │   │  (notify)    │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! ## Pass Flow
//!
//! 1. Aggregate, resolve conflicts. Conflicts never abort the pass; the
//!    non-conflicting remainder is applied and the report is degraded.
//! 2. Compare with the last snapshot; stop here if nothing changed
//! 3. Persist the new snapshot
//! 4. Compile and commit through a staging directory
//! 5. Reload with `force_start = false`
//!
//! The caller guarantees that at most one pass runs at a time.

use crate::aggregate::{RejectedRequest, aggregate};
use crate::change::{DesiredState, has_changed};
use crate::compile::{CompileContext, Serial, compile};
use crate::config::{BindSyncConfig, ZoneConfig};
use crate::conflict::{RequestStatus, request_statuses, resolve};
use crate::error::Result;
use crate::model::{ConflictKey, DnsRecordEntry, RequesterSubmission};
use crate::snapshot::ReconciliationSnapshot;
use crate::staging::StagedWriter;
use crate::topology::{self, ClusterTopology};
use crate::traits::{PeerRegistry, ReloadOutcome, Reloader, SnapshotStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Events emitted by the ReconcileEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A pass started
    PassStarted { requesters: usize },

    /// The topology could not be computed, the pass was abandoned
    TopologyUnavailable { reason: String },

    /// Some names were asked for with different answers
    ConflictsDetected { keys: Vec<ConflictKey> },

    /// Nothing changed since the last applied snapshot
    PassSkipped,

    /// The configuration will be regenerated
    ChangeDetected { forced: bool },

    /// The new snapshot was persisted
    SnapshotPersisted { zones: usize },

    /// Generated files were committed to the live directory
    FilesCommitted { count: usize },

    /// Committing generated files failed
    WriteFailed { error: String },

    /// The name server was asked to reload
    Reloaded { outcome: ReloadOutcome },

    /// Reloading the name server failed
    ReloadFailed { error: String },

    /// The name server was explicitly started
    ServerStarted,
}

/// Input of one pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileRequest {
    /// Every requester's current asks
    #[serde(default)]
    pub submissions: Vec<RequesterSubmission>,

    /// Secondary servers that announced themselves, on top of the
    /// configured allowlist
    #[serde(default)]
    pub secondary_transfer_ips: Vec<IpAddr>,

    /// Regenerate and reload even when nothing changed
    #[serde(default)]
    pub force: bool,
}

impl ReconcileRequest {
    pub fn new(submissions: Vec<RequesterSubmission>) -> Self {
        Self {
            submissions,
            ..Self::default()
        }
    }

    /// Bypass change detection
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn with_secondary_transfer_ips(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.secondary_transfer_ips = ips.into_iter().collect();
        self
    }
}

/// What a pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    /// Configuration was regenerated and committed
    Applied,
    /// Nothing changed, nothing was written
    Skipped,
}

/// Addresses and zones announced to upstream authorities and secondaries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityAdvertisement {
    pub addresses: BTreeSet<IpAddr>,
    pub zones: BTreeSet<String>,
}

/// Result of a completed pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub outcome: PassOutcome,

    /// Approval status of every ask, to relay to requesters
    pub statuses: Vec<RequestStatus>,

    /// Asks that failed validation
    pub rejected: Vec<RejectedRequest>,

    /// Conflicting entries grouped by the name they compete for
    pub conflicts: BTreeMap<ConflictKey, Vec<DnsRecordEntry>>,

    /// Live paths written by this pass
    pub files_written: Vec<PathBuf>,

    /// `None` when the pass was skipped
    pub reload: Option<ReloadOutcome>,

    pub authority: AuthorityAdvertisement,
}

impl PassReport {
    /// Some asks were not applied because of conflicts or invalid data
    pub fn is_degraded(&self) -> bool {
        !self.conflicts.is_empty() || !self.rejected.is_empty()
    }
}

/// Reconciliation engine
///
/// ## Lifecycle
///
/// 1. Create with [`ReconcileEngine::new()`]
/// 2. Call [`ReconcileEngine::reconcile()`] on every trigger
/// 3. Call [`ReconcileEngine::start_server()`] only on explicit request
///
/// ## Failure Semantics
///
/// - Topology unavailable: nothing is written, nothing is reloaded
/// - Write or reload failure: returned as-is, never retried. The snapshot is
///   already persisted at that point, so the next pass will not notice the
///   failure on its own; the caller must surface it.
pub struct ReconcileEngine {
    /// Source of peer group data
    registry: Box<dyn PeerRegistry>,

    /// Last applied snapshot, for change detection
    snapshot_store: Box<dyn SnapshotStore>,

    /// Name-server process control
    reloader: Box<dyn Reloader>,

    /// Zone rendering settings
    zone: ZoneConfig,

    writer: StagedWriter,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl ReconcileEngine {
    /// Create a new reconciliation engine
    ///
    /// # Parameters
    ///
    /// - `registry`: Peer registry implementation
    /// - `snapshot_store`: Snapshot store implementation
    /// - `reloader`: Name-server process control
    /// - `config`: bindsync configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        registry: Box<dyn PeerRegistry>,
        snapshot_store: Box<dyn SnapshotStore>,
        reloader: Box<dyn Reloader>,
        config: BindSyncConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            registry,
            snapshot_store,
            reloader,
            writer: StagedWriter::from_paths(&config.paths),
            zone: config.zone,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run one pass against the topology read from the peer registry
    ///
    /// # Returns
    ///
    /// - `Ok(PassReport)`: The pass was applied or skipped
    /// - `Err(Error::TopologyUnavailable)`: Nothing was written
    /// - `Err(Error::StateStore)`: The snapshot could not be persisted,
    ///   nothing was written
    /// - `Err(Error::Write | Error::Reload)`: Commit failed after the
    ///   snapshot was persisted
    pub async fn reconcile(&self, request: &ReconcileRequest) -> Result<PassReport> {
        self.emit_event(EngineEvent::PassStarted {
            requesters: request.submissions.len(),
        });

        let topology = match topology::current(self.registry.as_ref()).await {
            Ok(topology) => topology,
            Err(e) => {
                warn!("Abandoning pass: {}", e);
                self.emit_event(EngineEvent::TopologyUnavailable {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        self.reconcile_with_topology(request, &topology).await
    }

    /// Run one pass against an already computed topology
    pub async fn reconcile_with_topology(
        &self,
        request: &ReconcileRequest,
        topology: &ClusterTopology,
    ) -> Result<PassReport> {
        let start = Instant::now();

        let aggregation = aggregate(&request.submissions);
        debug!(
            "Zones: {:?} ({} entries)",
            aggregation.zones.keys().collect::<Vec<_>>(),
            aggregation.entry_count()
        );

        let resolution = resolve(&aggregation.zones);
        if resolution.has_conflicts() {
            warn!(
                "{} names have conflicting answers, applying the rest",
                resolution.conflict_groups().len()
            );
            self.emit_event(EngineEvent::ConflictsDetected {
                keys: resolution.conflict_groups().keys().cloned().collect(),
            });
        }

        let zones = resolution.accepted_zones(&aggregation.zones);
        let statuses = request_statuses(&request.submissions, &resolution, &aggregation.rejected);

        let transfer_ips: BTreeSet<IpAddr> = self
            .zone
            .secondary_transfer_ips
            .iter()
            .chain(&request.secondary_transfer_ips)
            .copied()
            .collect();

        let mut report = PassReport {
            outcome: PassOutcome::Skipped,
            statuses,
            rejected: aggregation.rejected,
            conflicts: resolution.conflict_groups().clone(),
            files_written: Vec::new(),
            reload: None,
            authority: AuthorityAdvertisement {
                addresses: topology.advertised_addresses(),
                zones: zones.keys().cloned().collect(),
            },
        };

        let previous = match self.snapshot_store.load().await {
            Ok(previous) => previous,
            Err(e) => {
                warn!("Could not read last snapshot, assuming change: {}", e);
                None
            }
        };

        let desired = DesiredState {
            zones: &zones,
            topology,
            secondary_transfer_ips: &transfer_ips,
            settings: &self.zone,
        };
        if !request.force && !has_changed(&desired, previous.as_ref()) {
            debug!("No change since last pass, skipping");
            self.emit_event(EngineEvent::PassSkipped);
            return Ok(report);
        }

        self.emit_event(EngineEvent::ChangeDetected {
            forced: request.force,
        });

        // Persisted first: after a crash below, the next pass still sees a
        // snapshot matching the target state.
        let snapshot =
            ReconciliationSnapshot::new(zones.clone(), Some(topology.clone()), transfer_ips.clone())
                .with_settings(self.zone.clone());
        self.snapshot_store.save(&snapshot).await?;
        self.emit_event(EngineEvent::SnapshotPersisted { zones: zones.len() });

        let ctx = CompileContext {
            topology,
            settings: &self.zone,
            secondary_transfer_ips: &transfer_ips,
            config_dir: self.writer.config_dir(),
            serial: Serial::now(),
        };
        let compiled = compile(&zones, &ctx);

        report.files_written = match self.writer.commit(&compiled).await {
            Ok(files) => files,
            Err(e) => {
                error!("Failed to commit configuration: {}", e);
                self.emit_event(EngineEvent::WriteFailed {
                    error: e.to_string(),
                });
                return Err(e);
            }
        };
        self.emit_event(EngineEvent::FilesCommitted {
            count: report.files_written.len(),
        });

        let outcome = match self.reloader.reload(false).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to reload {}: {}", self.reloader.service_name(), e);
                self.emit_event(EngineEvent::ReloadFailed {
                    error: e.to_string(),
                });
                return Err(e);
            }
        };
        match outcome {
            ReloadOutcome::Reloaded => info!("Reloaded {}", self.reloader.service_name()),
            ReloadOutcome::NotRunning => info!(
                "{} is not running, leaving it stopped",
                self.reloader.service_name()
            ),
        }
        self.emit_event(EngineEvent::Reloaded { outcome });

        report.outcome = PassOutcome::Applied;
        report.reload = Some(outcome);

        info!(
            "Applied {} zones ({} files) in {} ms",
            zones.len(),
            report.files_written.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(report)
    }

    /// Start the name server
    ///
    /// Passes never start a stopped server; this is the explicit way to.
    pub async fn start_server(&self) -> Result<()> {
        self.reloader.start().await?;
        info!("Started {}", self.reloader.service_name());
        self.emit_event(EngineEvent::ServerStarted);
        Ok(())
    }

    /// Emit an engine event
    ///
    /// # Parameters
    ///
    /// - `event`: The event to emit
    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!(
                "Event channel full, dropping event. Consider increasing event_channel_capacity."
            );
        }
    }
}
