// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunbookError {
    #[error("failed to read workflow spec at {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },

    #[error("failed to parse workflow spec at {path}: {source}")]
    Parse { path: String, #[source] source: toml::de::Error },

    #[error("duplicate step id: {0}")]
    DuplicateStepId(String),

    #[error("step indexes are not contiguous from 0: got {0:?}")]
    NonDenseStepIndex(Vec<u32>),

    #[error("step {step} references unknown agent {agent}")]
    UnknownAgent { step: String, agent: String },

    #[error("step {step} has verifyStep {verify_step:?} which names no step in this workflow")]
    UnknownVerifyStep { step: String, verify_step: String },

    #[error("workflow has no steps")]
    NoSteps,
}
