//! Common test utilities and helpers.
//!
//! Builds workspaces around a scripted engine with a known two-function
//! image: f1 at 0x1000 and f2 at 0x2000, 0x40 bytes each.

#![allow(dead_code)]

use osanwe::config::WorkspaceConfig;
use osanwe::core::Addr;
use osanwe::engine::ScriptedEngine;
use osanwe::events::{Event, Subscription};
use osanwe::workspace::Workspace;
use std::sync::Arc;
use std::time::Duration;

pub const F1: Addr = Addr(0x1000);
pub const F2: Addr = Addr(0x2000);

/// Engine with the standard two-function image.
pub fn two_function_engine() -> ScriptedEngine {
    ScriptedEngine::new()
        .with_linear_function(F1, "f1", 0x40)
        .with_linear_function(F2, "f2", 0x40)
}

/// Write a small sample image and return its path inside the temp dir.
pub fn sample_binary(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("sample.bin");
    std::fs::write(&path, b"osanwe test image").expect("write sample");
    path
}

/// A workspace over the standard engine (plus per-test tweaks).
pub fn open_workspace(engine: ScriptedEngine) -> (Workspace, tempfile::TempDir) {
    open_workspace_with(engine, WorkspaceConfig::default())
}

pub fn open_workspace_with(
    engine: ScriptedEngine,
    config: WorkspaceConfig,
) -> (Workspace, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = sample_binary(&dir);
    let workspace =
        Workspace::open(Arc::new(engine), &path, config).expect("workspace should open");
    (workspace, dir)
}

/// Collect the next `n` events, failing the test on a stalled bus.
pub async fn collect_events(subscription: &mut Subscription, n: usize) -> Vec<Event> {
    let mut events = Vec::with_capacity(n);
    for _ in 0..n {
        let event = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
            .await
            .expect("timed out waiting for event")
            .expect("bus closed early");
        events.push(event);
    }
    events
}

/// Give the bus dispatch task a moment to fan out already-published
/// events, then drain the view registry. Returns how many events were
/// dispatched to views.
pub async fn settle(workspace: &Workspace) -> usize {
    tokio::time::sleep(Duration::from_millis(100)).await;
    workspace.views().pump_pending().await
}

/// Commit sequence numbers of the session events in `events`, in
/// delivery order.
pub fn session_seqs(events: &[Event]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Session(cs) => Some(cs.seq),
            _ => None,
        })
        .collect()
}
