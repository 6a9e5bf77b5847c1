// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("could not determine state directory")]
    NoStateDir,

    #[error("failed to acquire PID file lock at {0}: daemon already running?")]
    LockFailed(PathBuf, #[source] std::io::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] antfarm_storage::StoreError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] antfarm_pipeline::PipelineError),

    #[error("sweeper error: {0}")]
    Sweeper(#[from] antfarm_sweeper::SweeperError),

    #[error("spawner error: {0}")]
    Spawner(#[from] antfarm_spawner::SpawnerError),
}
