// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpawnerError {
    #[error("storage error: {0}")]
    Storage(#[from] antfarm_storage::StoreError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] antfarm_pipeline::PipelineError),

    #[error("gateway error: {0}")]
    Gateway(#[from] antfarm_gateway::GatewayError),

    #[error("agent {0} not declared in workflow spec")]
    UnknownAgent(String),

    #[error("step not found: {0}")]
    StepNotFound(String),

    #[error("story not found: {0}")]
    StoryNotFound(String),
}
