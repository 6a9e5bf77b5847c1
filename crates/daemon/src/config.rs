// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration, resolved from the environment (§4.7, §5).

use std::path::PathBuf;
use std::time::Duration;

use antfarm_sweeper::{CLAIMING_SWEEP_INTERVAL, GENERAL_SWEEP_INTERVAL, SESSION_STALE_AFTER};

use crate::env;
use crate::error::DaemonError;

#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub db_path: PathBuf,
    pub journal_path: PathBuf,
    pub pid_path: PathBuf,
    pub workflows_path: PathBuf,
    pub poll_interval: Duration,
    pub sweep_interval: Duration,
    pub claiming_sweep_interval: Duration,
    pub session_gc_interval: Duration,
    /// Restricts the daemon to these workflow ids; empty means "all".
    pub workflow_allowlist: Vec<String>,
}

impl Config {
    /// Load configuration for the user-level daemon. One daemon serves
    /// every workflow under `~/.local/state/antfarm/` (or
    /// `$XDG_STATE_HOME/antfarm/`) unless narrowed by an allow-list.
    pub fn load() -> Result<Self, DaemonError> {
        let state_dir = env::state_dir()?;

        Ok(Self {
            db_path: state_dir.join("store.wal"),
            journal_path: state_dir.join("events.ndjson"),
            pid_path: state_dir.join("daemon.pid"),
            workflows_path: state_dir.join("workflows"),
            poll_interval: env::poll_interval(),
            sweep_interval: GENERAL_SWEEP_INTERVAL,
            claiming_sweep_interval: CLAIMING_SWEEP_INTERVAL,
            session_gc_interval: SESSION_STALE_AFTER / 6,
            workflow_allowlist: env::workflow_allowlist(),
            state_dir,
        })
    }

    pub fn allows(&self, workflow_id: &str) -> bool {
        self.workflow_allowlist.is_empty() || self.workflow_allowlist.iter().any(|w| w == workflow_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allowlist_allows_everything() {
        let config = Config {
            state_dir: PathBuf::new(),
            db_path: PathBuf::new(),
            journal_path: PathBuf::new(),
            pid_path: PathBuf::new(),
            workflows_path: PathBuf::new(),
            poll_interval: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(300),
            claiming_sweep_interval: Duration::from_secs(120),
            session_gc_interval: Duration::from_secs(600),
            workflow_allowlist: Vec::new(),
        };
        assert!(config.allows("anything"));
    }

    #[test]
    fn nonempty_allowlist_restricts() {
        let config = Config {
            state_dir: PathBuf::new(),
            db_path: PathBuf::new(),
            journal_path: PathBuf::new(),
            pid_path: PathBuf::new(),
            workflows_path: PathBuf::new(),
            poll_interval: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(300),
            claiming_sweep_interval: Duration::from_secs(120),
            session_gc_interval: Duration::from_secs(600),
            workflow_allowlist: vec!["alpha".to_string()],
        };
        assert!(config.allows("alpha"));
        assert!(!config.allows("beta"));
    }
}
