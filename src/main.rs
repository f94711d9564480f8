use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use salesboard_lib::config::load_config;
use salesboard_lib::poller::{run_refresh_poller, run_snapshot_writer};
use salesboard_lib::source::http::HttpRecordSource;
use salesboard_lib::sync::SyncEngine;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let source = match HttpRecordSource::new(
        &config.base_url,
        config.api_key.as_deref(),
        config.request_timeout_ms,
    ) {
        Ok(source) => source,
        Err(e) => {
            log::error!("{} ({})", e, e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    let interval = Duration::from_secs(config.refresh_interval_secs);
    let snapshot_path = config.snapshot_path.clone();
    let engine = SyncEngine::new(Arc::new(source), config);

    if let Some(path) = snapshot_path {
        log::info!("Writing dashboard snapshots to {}", path.display());
        tokio::spawn(run_snapshot_writer(engine.subscribe(), path));
    }

    let wake = Arc::new(Notify::new());
    tokio::spawn(run_refresh_poller(engine.clone(), interval, wake.clone()));
    #[cfg(unix)]
    spawn_manual_refresh(wake);

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
    }
    let latency = engine.latency();
    for rollup in &latency.sources {
        log::info!(
            "{}: p50 {} ms, p95 {} ms, {} failures ({} in a row)",
            rollup.source,
            rollup.p50_ms,
            rollup.p95_ms,
            rollup.failures,
            rollup.consecutive_failures
        );
    }
    log::info!("Shutting down");
}

/// `kill -USR1 <pid>` forces a reload.
#[cfg(unix)]
fn spawn_manual_refresh(wake: Arc<Notify>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut usr1 = match signal(SignalKind::user_defined1()) {
        Ok(stream) => stream,
        Err(e) => {
            log::warn!("Manual refresh via SIGUSR1 unavailable: {}", e);
            return;
        }
    };
    tokio::spawn(async move {
        while usr1.recv().await.is_some() {
            wake.notify_one();
        }
    });
}
