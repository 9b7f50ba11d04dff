//! Contract Test: Reload Semantics
//!
//! Constraints verified:
//! - Passes reload with force_start = false
//! - A stopped name server is never started by a pass
//! - Reload failures are surfaced and not retried
//! - Starting the server is a separate, explicit operation

mod common;

use bindsync_core::engine::{EngineEvent, ReconcileEngine, ReconcileRequest};
use bindsync_core::error::Error;
use bindsync_core::traits::ReloadOutcome;
use common::*;
use std::sync::Arc;
use tempfile::tempdir;

fn request() -> ReconcileRequest {
    ReconcileRequest::new(vec![submission(
        "app-a",
        vec![ask("a1", "dns.test", "admin", "42.42.42.42")],
    )])
}

#[tokio::test]
async fn stopped_server_is_not_started() {
    let dir = tempdir().unwrap();
    let reloader = Arc::new(MockReloader::stopped());
    let (engine, _events) = ReconcileEngine::new(
        Box::new(active_registry()),
        Box::new(MockSnapshotStore::new()),
        Box::new(MockReloader::sharing_counters_with(&reloader)),
        test_config(dir.path()),
    )
    .unwrap();

    let report = engine.reconcile(&request()).await.unwrap();

    assert_eq!(report.reload, Some(ReloadOutcome::NotRunning));
    assert_eq!(reloader.force_starts(), vec![false]);
    assert_eq!(reloader.start_call_count(), 0);
    assert!(!reloader.is_running());
}

#[tokio::test]
async fn reload_failure_is_surfaced_once() {
    let dir = tempdir().unwrap();
    let reloader = Arc::new(MockReloader::failing());
    let (engine, mut events) = ReconcileEngine::new(
        Box::new(active_registry()),
        Box::new(MockSnapshotStore::new()),
        Box::new(MockReloader::sharing_counters_with(&reloader)),
        test_config(dir.path()),
    )
    .unwrap();

    let err = engine.reconcile(&request()).await.unwrap_err();
    assert!(matches!(err, Error::Reload(_)));
    assert!(err.is_commit_failure());
    assert_eq!(reloader.reload_call_count(), 1, "reload must not be retried");

    // The files were committed before the reload was attempted
    assert!(config_dir(dir.path()).join("named.conf.local").exists());

    let events = drain_events(&mut events);
    assert!(events.iter().any(|e| matches!(e, EngineEvent::ReloadFailed { .. })));
}

#[tokio::test]
async fn start_is_explicit() {
    let dir = tempdir().unwrap();
    let reloader = Arc::new(MockReloader::stopped());
    let (engine, mut events) = ReconcileEngine::new(
        Box::new(active_registry()),
        Box::new(MockSnapshotStore::new()),
        Box::new(MockReloader::sharing_counters_with(&reloader)),
        test_config(dir.path()),
    )
    .unwrap();

    engine.start_server().await.unwrap();
    assert_eq!(reloader.start_call_count(), 1);
    assert!(reloader.is_running());

    // Once running, a forced pass reloads it
    let report = engine.reconcile(&request().forced()).await.unwrap();
    assert_eq!(report.reload, Some(ReloadOutcome::Reloaded));

    let events = drain_events(&mut events);
    assert_eq!(events.first(), Some(&EngineEvent::ServerStarted));
}
