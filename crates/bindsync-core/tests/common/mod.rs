//! Test doubles and common utilities for contract tests
//!
//! The doubles count calls so tests can assert on what the engine did
//! (or did not) ask its collaborators to do.

#![allow(dead_code)]

use bindsync_core::engine::EngineEvent;
use bindsync_core::error::{Error, Result};
use bindsync_core::snapshot::{MemorySnapshotStore, ReconciliationSnapshot};
use bindsync_core::traits::{ReloadOutcome, Reloader, SnapshotStore};
use bindsync_core::{
    BindSyncConfig, PathsConfig, PeerView, RecordRequest, RequesterSubmission, StaticPeerRegistry,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// A mock Reloader that tracks calls
pub struct MockReloader {
    reload_call_count: Arc<AtomicUsize>,
    start_call_count: Arc<AtomicUsize>,
    /// `force_start` argument of every reload() call
    force_starts: Arc<std::sync::Mutex<Vec<bool>>>,
    running: Arc<AtomicBool>,
    fail: bool,
}

impl MockReloader {
    /// A reloader managing a running service
    pub fn running() -> Self {
        Self::with_state(true, false)
    }

    /// A reloader managing a service that was stopped on purpose
    pub fn stopped() -> Self {
        Self::with_state(false, false)
    }

    /// A reloader whose reload() always fails
    pub fn failing() -> Self {
        Self::with_state(true, true)
    }

    fn with_state(running: bool, fail: bool) -> Self {
        Self {
            reload_call_count: Arc::new(AtomicUsize::new(0)),
            start_call_count: Arc::new(AtomicUsize::new(0)),
            force_starts: Arc::new(std::sync::Mutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(running)),
            fail,
        }
    }

    /// Create a new MockReloader that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            reload_call_count: Arc::clone(&other.reload_call_count),
            start_call_count: Arc::clone(&other.start_call_count),
            force_starts: Arc::clone(&other.force_starts),
            running: Arc::clone(&other.running),
            fail: other.fail,
        }
    }

    pub fn reload_call_count(&self) -> usize {
        self.reload_call_count.load(Ordering::SeqCst)
    }

    pub fn start_call_count(&self) -> usize {
        self.start_call_count.load(Ordering::SeqCst)
    }

    pub fn force_starts(&self) -> Vec<bool> {
        self.force_starts.lock().unwrap().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Reloader for MockReloader {
    async fn reload(&self, force_start: bool) -> Result<ReloadOutcome> {
        self.reload_call_count.fetch_add(1, Ordering::SeqCst);
        self.force_starts.lock().unwrap().push(force_start);

        if self.fail {
            return Err(Error::reload("mock reload failure"));
        }

        if self.is_running() || force_start {
            self.running.store(true, Ordering::SeqCst);
            Ok(ReloadOutcome::Reloaded)
        } else {
            Ok(ReloadOutcome::NotRunning)
        }
    }

    async fn start(&self) -> Result<()> {
        self.start_call_count.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn service_name(&self) -> &str {
        "mock-named"
    }
}

/// A snapshot store that counts calls, backed by a shared memory store
pub struct MockSnapshotStore {
    inner: MemorySnapshotStore,
    load_call_count: Arc<AtomicUsize>,
    save_call_count: Arc<AtomicUsize>,
}

impl MockSnapshotStore {
    pub fn new() -> Self {
        Self {
            inner: MemorySnapshotStore::new(),
            load_call_count: Arc::new(AtomicUsize::new(0)),
            save_call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a new MockSnapshotStore sharing state and counters with an
    /// existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            inner: other.inner.clone(),
            load_call_count: Arc::clone(&other.load_call_count),
            save_call_count: Arc::clone(&other.save_call_count),
        }
    }

    pub fn load_call_count(&self) -> usize {
        self.load_call_count.load(Ordering::SeqCst)
    }

    pub fn save_call_count(&self) -> usize {
        self.save_call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MockSnapshotStore {
    async fn load(&self) -> Result<Option<ReconciliationSnapshot>> {
        self.load_call_count.fetch_add(1, Ordering::SeqCst);
        self.inner.load().await
    }

    async fn save(&self, snapshot: &ReconciliationSnapshot) -> Result<()> {
        self.save_call_count.fetch_add(1, Ordering::SeqCst);
        self.inner.save(snapshot).await
    }
}

/// Peer group of three units where `current` and `active` are among
/// 1.1.1.1, 2.2.2.2 and 3.3.3.3
pub fn three_units(current: &str, active: Option<&str>) -> PeerView {
    PeerView {
        unit_addresses: vec![
            "1.1.1.1".to_string(),
            "2.2.2.2".to_string(),
            "3.3.3.3".to_string(),
        ],
        active_unit: active.map(str::to_string),
        bind_address: Some(current.to_string()),
    }
}

/// Registry where the current unit is the active one
pub fn active_registry() -> StaticPeerRegistry {
    StaticPeerRegistry::with_view(three_units("1.1.1.1", Some("1.1.1.1")))
}

/// Registry where the current unit is a standby
pub fn standby_registry() -> StaticPeerRegistry {
    StaticPeerRegistry::with_view(three_units("2.2.2.2", Some("1.1.1.1")))
}

/// Configuration writing into `<root>/bind`, staging under `root`
pub fn test_config(root: &Path) -> BindSyncConfig {
    let mut config = BindSyncConfig::new("hostmaster");
    config.paths = PathsConfig {
        config_dir: root.join("bind"),
        staging_root: Some(root.to_path_buf()),
    };
    config
}

pub fn config_dir(root: &Path) -> PathBuf {
    root.join("bind")
}

/// A raw A-record ask
pub fn ask(id: &str, domain: &str, host_label: &str, data: &str) -> RecordRequest {
    RecordRequest {
        id: id.to_string(),
        domain: domain.to_string(),
        host_label: host_label.to_string(),
        ttl: 600,
        record_class: "IN".to_string(),
        record_type: "A".to_string(),
        record_data: data.to_string(),
    }
}

pub fn submission(requester: &str, requests: Vec<RecordRequest>) -> RequesterSubmission {
    RequesterSubmission::new(requester, requests)
}

/// Drain every event currently buffered in `rx`
pub fn drain_events(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
