// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

use crate::migration::MigrationError;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Wal(#[from] WalError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("step not found: {0}")]
    StepNotFound(String),

    #[error("story not found: {0}")]
    StoryNotFound(String),

    #[error("step index {index} already used by another step in run {run}")]
    DuplicateStepIndex { run: String, index: u32 },
}
