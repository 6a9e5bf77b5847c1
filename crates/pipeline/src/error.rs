// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("storage error: {0}")]
    Storage(#[from] antfarm_storage::StoreError),

    #[error("invalid STORIES_JSON: {0}")]
    InvalidStoriesJson(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("step not found: {0}")]
    StepNotFound(String),

    #[error("workflow spec error: {0}")]
    Spec(#[from] antfarm_runbook::RunbookError),
}
