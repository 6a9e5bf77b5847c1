// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::DaemonError;

/// Floor and default for `§4.7`'s `interval_ms` ticker.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(30_000);
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10_000);

/// Resolve the state directory: `ANTFARM_STATE_DIR` > `XDG_STATE_HOME/antfarm`
/// > `~/.local/state/antfarm`.
pub fn state_dir() -> Result<PathBuf, DaemonError> {
    if let Ok(dir) = std::env::var("ANTFARM_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("antfarm"));
    }
    dirs::home_dir().map(|home| home.join(".local/state/antfarm")).ok_or(DaemonError::NoStateDir)
}

/// Ticker interval (§4.7: default 30s, floor 10s).
pub fn poll_interval() -> Duration {
    let configured = std::env::var("ANTFARM_POLL_INTERVAL_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_POLL_INTERVAL);
    configured.max(MIN_POLL_INTERVAL)
}

/// Comma-separated allow-list of workflow ids the daemon should service;
/// empty means "every daemon-scheduled workflow" (§4.7 step 1).
pub fn workflow_allowlist() -> Vec<String> {
    std::env::var("ANTFARM_WORKFLOW_ALLOWLIST")
        .ok()
        .map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}
