//! Background tasks around the sync engine.
//!
//! - Refresh poller: starts a cycle immediately, then every
//!   `refresh_interval` or whenever `wake` is notified.
//! - Snapshot writer: mirrors every published snapshot to a JSON file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};

use crate::sync::{DashboardSnapshot, SyncEngine};

/// Long-lived refresh loop. A zero `interval` disables the timer; manual
/// wakes still start cycles.
pub async fn run_refresh_poller(engine: SyncEngine, interval: Duration, wake: Arc<Notify>) {
    loop {
        let cycle = engine.refresh();
        log::info!("Refresh poller: started cycle {}", cycle.0);

        if interval.is_zero() {
            wake.notified().await;
            log::info!("Refresh poller: woken by manual refresh");
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {},
            _ = wake.notified() => {
                log::info!("Refresh poller: woken by manual refresh");
            },
        }
    }
}

/// Write each published snapshot to `path` until the engine goes away.
pub async fn run_snapshot_writer(mut rx: watch::Receiver<Arc<DashboardSnapshot>>, path: PathBuf) {
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        if let Err(e) = write_snapshot(&path, &snapshot).await {
            log::warn!("Snapshot writer: {}", e);
        }
    }
    log::debug!("Snapshot writer: engine dropped, stopping");
}

/// Replace `path` with the pretty-printed snapshot via a temp file + rename.
pub async fn write_snapshot(path: &Path, snapshot: &DashboardSnapshot) -> Result<(), String> {
    let payload = serde_json::to_string_pretty(snapshot)
        .map_err(|e| format!("Failed to serialize snapshot: {}", e))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }
    let temp_path = path.with_extension("json.tmp");
    tokio::fs::write(&temp_path, payload)
        .await
        .map_err(|e| format!("Failed to write temp file {}: {}", temp_path.display(), e))?;
    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|e| format!("Failed to replace {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::sync::SnapshotPhase;
    use crate::test_support::MemorySource;
    use serde_json::json;

    fn engine() -> SyncEngine {
        let source = Arc::new(MemorySource::new());
        source.set_table("advisors", vec![json!({ "ID": 1, "NOMBRE": "Ana" })]);
        let config: Config = serde_json::from_value(json!({ "baseUrl": "memory://store" })).unwrap();
        SyncEngine::new(source, config)
    }

    #[tokio::test]
    async fn test_write_snapshot_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dashboard.json");
        let snapshot = DashboardSnapshot {
            cycle: 7,
            ..Default::default()
        };

        write_snapshot(&path, &snapshot).await.unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["cycle"], 7);
        assert_eq!(written["phase"], "empty");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_manual_wake_starts_new_cycle() {
        let engine = engine();
        let mut rx = engine.subscribe();
        let wake = Arc::new(Notify::new());
        let poller = tokio::spawn(run_refresh_poller(
            engine.clone(),
            Duration::ZERO,
            wake.clone(),
        ));

        rx.wait_for(|s| s.cycle == 1 && s.phase == SnapshotPhase::Complete)
            .await
            .unwrap();
        wake.notify_one();
        rx.wait_for(|s| s.cycle == 2 && s.phase == SnapshotPhase::Complete)
            .await
            .unwrap();
        assert_eq!(engine.snapshot().advisors[0].name, "Ana");
        poller.abort();
    }

    #[tokio::test]
    async fn test_snapshot_writer_follows_commits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard.json");
        let engine = engine();
        let mut rx = engine.subscribe();
        let writer = tokio::spawn(run_snapshot_writer(engine.subscribe(), path.clone()));

        engine.refresh();
        rx.wait_for(|s| s.phase == SnapshotPhase::Complete).await.unwrap();
        drop(rx);
        drop(engine);
        // The writer stops once the last sender is gone.
        writer.await.unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["phase"], "complete");
        assert_eq!(written["advisors"][0]["NOMBRE"], "Ana");
    }
}
