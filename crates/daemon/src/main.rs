// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use antfarm_core::SystemClock;
use antfarm_daemon::{run, Config, Daemon, PidFile};
use antfarm_events::Journal;
use antfarm_gateway::{Gateway, HttpGateway};
use antfarm_storage::Store;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run_daemon().await {
        tracing::error!(error = %e, "daemon exited with error");
        std::process::exit(1);
    }
}

async fn run_daemon() -> Result<(), antfarm_daemon::DaemonError> {
    let config = Config::load()?;
    std::fs::create_dir_all(&config.state_dir)?;
    std::fs::create_dir_all(&config.workflows_path)?;

    let pid_file = PidFile::acquire(&config.pid_path)?;
    tracing::info!(state_dir = %config.state_dir.display(), "antfarmd starting");

    let store = Store::open(&config.db_path)?;
    let journal = Journal::open(&config.journal_path);
    let gateway_url =
        std::env::var("ANTFARM_GATEWAY_URL").unwrap_or_else(|_| "http://localhost:8787".to_string());
    let gateway: Arc<dyn Gateway> = Arc::new(HttpGateway::new(gateway_url));

    let clock = SystemClock;
    let poll_interval = config.poll_interval;
    let claiming_interval = config.claiming_sweep_interval;
    let session_gc_interval = config.session_gc_interval;
    let daemon = Arc::new(Daemon::new(config, clock));
    let store = Arc::new(tokio::sync::Mutex::new(store));
    let journal = Some(Arc::new(journal));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(wait_for_signal(shutdown_tx));

    run(daemon, store, journal, gateway, poll_interval, claiming_interval, session_gc_interval, shutdown_rx).await;

    pid_file.remove();
    tracing::info!("antfarmd shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal(shutdown_tx: tokio::sync::watch::Sender<bool>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };
    let mut int = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to install SIGINT handler");
            return;
        }
    };

    tokio::select! {
        _ = term.recv() => tracing::info!("received SIGTERM"),
        _ = int.recv() => tracing::info!("received SIGINT"),
    }
    let _ = shutdown_tx.send(true);
}

#[cfg(not(unix))]
async fn wait_for_signal(shutdown_tx: tokio::sync::watch::Sender<bool>) {
    let _ = tokio::signal::ctrl_c().await;
    let _ = shutdown_tx.send(true);
}
