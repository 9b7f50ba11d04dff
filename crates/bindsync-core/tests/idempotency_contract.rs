//! Contract Test: Change Detection & Idempotency
//!
//! Constraints verified:
//! - An unchanged state never rewrites configuration or reloads
//! - Submission order does not matter
//! - Any change to zones, topology or the transfer allowlist is applied
//! - A persisted snapshot survives an engine restart
//! - New zone rendering settings are applied after a restart
//! - A missing or corrupt snapshot means "changed"

mod common;

use bindsync_core::engine::{PassOutcome, ReconcileEngine, ReconcileRequest};
use bindsync_core::snapshot::FileSnapshotStore;
use bindsync_core::{ClusterTopology, StaticPeerRegistry};
use common::*;
use std::net::IpAddr;
use std::sync::Arc;
use tempfile::tempdir;

fn two_requesters() -> ReconcileRequest {
    ReconcileRequest::new(vec![
        submission("app-a", vec![ask("a1", "dns.test", "admin", "42.42.42.42")]),
        submission(
            "app-b",
            vec![
                ask("b1", "dns.test", "www", "10.0.0.1"),
                ask("b2", "other.test", "api", "10.0.0.2"),
            ],
        ),
    ])
}

#[tokio::test]
async fn identical_pass_is_skipped() {
    let dir = tempdir().unwrap();
    let reloader = Arc::new(MockReloader::running());

    let (engine, _events) = ReconcileEngine::new(
        Box::new(active_registry()),
        Box::new(MockSnapshotStore::new()),
        Box::new(MockReloader::sharing_counters_with(&reloader)),
        test_config(dir.path()),
    )
    .expect("engine construction succeeds");

    let first = engine.reconcile(&two_requesters()).await.unwrap();
    assert_eq!(first.outcome, PassOutcome::Applied);

    let second = engine.reconcile(&two_requesters()).await.unwrap();
    assert_eq!(second.outcome, PassOutcome::Skipped);
    assert!(second.files_written.is_empty());
    assert_eq!(second.reload, None);

    assert_eq!(reloader.reload_call_count(), 1, "unchanged pass must not reload");
}

#[tokio::test]
async fn reordered_submissions_are_not_a_change() {
    let dir = tempdir().unwrap();
    let reloader = Arc::new(MockReloader::running());
    let (engine, _events) = ReconcileEngine::new(
        Box::new(active_registry()),
        Box::new(MockSnapshotStore::new()),
        Box::new(MockReloader::sharing_counters_with(&reloader)),
        test_config(dir.path()),
    )
    .unwrap();

    engine.reconcile(&two_requesters()).await.unwrap();

    let mut reordered = two_requesters();
    reordered.submissions.reverse();
    for submission in &mut reordered.submissions {
        submission.requests.reverse();
    }

    let report = engine.reconcile(&reordered).await.unwrap();
    assert_eq!(report.outcome, PassOutcome::Skipped);
    assert_eq!(reloader.reload_call_count(), 1);
}

#[tokio::test]
async fn ttl_change_is_applied() {
    let dir = tempdir().unwrap();
    let (engine, _events) = ReconcileEngine::new(
        Box::new(active_registry()),
        Box::new(MockSnapshotStore::new()),
        Box::new(MockReloader::running()),
        test_config(dir.path()),
    )
    .unwrap();

    engine.reconcile(&two_requesters()).await.unwrap();

    let mut changed = two_requesters();
    changed.submissions[0].requests[0].ttl = 300;
    let report = engine.reconcile(&changed).await.unwrap();
    assert_eq!(report.outcome, PassOutcome::Applied);
}

#[tokio::test]
async fn topology_change_is_applied() {
    let dir = tempdir().unwrap();
    let registry = active_registry();
    let (engine, _events) = ReconcileEngine::new(
        Box::new(registry.clone()),
        Box::new(MockSnapshotStore::new()),
        Box::new(MockReloader::running()),
        test_config(dir.path()),
    )
    .unwrap();

    engine.reconcile(&two_requesters()).await.unwrap();

    // A fourth unit joins as a standby, the zones stay the same
    let mut view = three_units("1.1.1.1", Some("1.1.1.1"));
    view.unit_addresses.push("4.4.4.4".to_string());
    registry.set(view).await;

    let report = engine.reconcile(&two_requesters()).await.unwrap();
    assert_eq!(report.outcome, PassOutcome::Applied);

    let conf = std::fs::read_to_string(config_dir(dir.path()).join("named.conf.local")).unwrap();
    assert!(conf.contains("allow-transfer { 2.2.2.2;3.3.3.3;4.4.4.4; }"));
}

#[tokio::test]
async fn transfer_allowlist_change_is_applied() {
    let dir = tempdir().unwrap();
    let (engine, _events) = ReconcileEngine::new(
        Box::new(active_registry()),
        Box::new(MockSnapshotStore::new()),
        Box::new(MockReloader::running()),
        test_config(dir.path()),
    )
    .unwrap();

    engine.reconcile(&two_requesters()).await.unwrap();

    let secondary: IpAddr = "10.0.0.53".parse().unwrap();
    let request = two_requesters().with_secondary_transfer_ips([secondary]);
    let report = engine.reconcile(&request).await.unwrap();
    assert_eq!(report.outcome, PassOutcome::Applied);
}

#[tokio::test]
async fn forced_pass_bypasses_change_detection() {
    let dir = tempdir().unwrap();
    let reloader = Arc::new(MockReloader::running());
    let (engine, _events) = ReconcileEngine::new(
        Box::new(active_registry()),
        Box::new(MockSnapshotStore::new()),
        Box::new(MockReloader::sharing_counters_with(&reloader)),
        test_config(dir.path()),
    )
    .unwrap();

    engine.reconcile(&two_requesters()).await.unwrap();
    let report = engine.reconcile(&two_requesters().forced()).await.unwrap();

    assert_eq!(report.outcome, PassOutcome::Applied);
    assert_eq!(reloader.reload_call_count(), 2);
}

#[tokio::test]
async fn restart_with_file_snapshot_does_not_reload() {
    let dir = tempdir().unwrap();
    let state_path = dir.path().join("state").join("state.json");
    let reloader = Arc::new(MockReloader::running());

    // First "run": apply and persist the snapshot
    {
        let (engine, _events) = ReconcileEngine::new(
            Box::new(active_registry()),
            Box::new(FileSnapshotStore::new(&state_path).await.unwrap()),
            Box::new(MockReloader::sharing_counters_with(&reloader)),
            test_config(dir.path()),
        )
        .unwrap();
        engine.reconcile(&two_requesters()).await.unwrap();
    }

    // Second "run": same inputs, fresh engine
    let (engine, _events) = ReconcileEngine::new(
        Box::new(active_registry()),
        Box::new(FileSnapshotStore::new(&state_path).await.unwrap()),
        Box::new(MockReloader::sharing_counters_with(&reloader)),
        test_config(dir.path()),
    )
    .unwrap();
    let report = engine.reconcile(&two_requesters()).await.unwrap();

    assert_eq!(report.outcome, PassOutcome::Skipped);
    assert_eq!(reloader.reload_call_count(), 1);
}

#[tokio::test]
async fn restart_with_new_settings_regenerates() {
    let dir = tempdir().unwrap();
    let state_path = dir.path().join("state.json");
    let reloader = Arc::new(MockReloader::running());

    {
        let (engine, _events) = ReconcileEngine::new(
            Box::new(active_registry()),
            Box::new(FileSnapshotStore::new(&state_path).await.unwrap()),
            Box::new(MockReloader::sharing_counters_with(&reloader)),
            test_config(dir.path()),
        )
        .unwrap();
        engine.reconcile(&two_requesters()).await.unwrap();
    }

    let public_ip: IpAddr = "203.0.113.10".parse().unwrap();
    let mut config = test_config(dir.path());
    config.zone = config.zone.with_public_ips([public_ip]);

    let (engine, _events) = ReconcileEngine::new(
        Box::new(active_registry()),
        Box::new(FileSnapshotStore::new(&state_path).await.unwrap()),
        Box::new(MockReloader::sharing_counters_with(&reloader)),
        config,
    )
    .unwrap();
    let report = engine.reconcile(&two_requesters()).await.unwrap();

    assert_eq!(report.outcome, PassOutcome::Applied);
    assert_eq!(reloader.reload_call_count(), 2);
    let zone = std::fs::read_to_string(config_dir(dir.path()).join("db.dns.test")).unwrap();
    assert!(zone.contains("ns IN A 203.0.113.10\n"));

    // And the new settings are now the baseline
    let again = engine.reconcile(&two_requesters()).await.unwrap();
    assert_eq!(again.outcome, PassOutcome::Skipped);
}

#[tokio::test]
async fn corrupt_snapshot_counts_as_change() {
    let dir = tempdir().unwrap();
    let state_path = dir.path().join("state.json");
    let reloader = Arc::new(MockReloader::running());

    let (engine, _events) = ReconcileEngine::new(
        Box::new(active_registry()),
        Box::new(FileSnapshotStore::new(&state_path).await.unwrap()),
        Box::new(MockReloader::sharing_counters_with(&reloader)),
        test_config(dir.path()),
    )
    .unwrap();

    engine.reconcile(&two_requesters()).await.unwrap();
    std::fs::write(&state_path, "{ not json").unwrap();

    let report = engine.reconcile(&two_requesters()).await.unwrap();
    assert_eq!(report.outcome, PassOutcome::Applied);
    assert_eq!(reloader.reload_call_count(), 2);
}

#[tokio::test]
async fn explicit_topology_entry_point() {
    let dir = tempdir().unwrap();
    let (engine, _events) = ReconcileEngine::new(
        Box::new(StaticPeerRegistry::new()),
        Box::new(MockSnapshotStore::new()),
        Box::new(MockReloader::running()),
        test_config(dir.path()),
    )
    .unwrap();

    // The registry is empty, but a caller-supplied topology is enough
    let ip: IpAddr = "1.1.1.1".parse().unwrap();
    let topology = ClusterTopology::new([ip], Some(ip), ip);
    let report = engine
        .reconcile_with_topology(&two_requesters(), &topology)
        .await
        .unwrap();

    assert_eq!(report.outcome, PassOutcome::Applied);
    assert!(config_dir(dir.path()).join("db.dns.test").exists());
}
