// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SweeperError {
    #[error("storage error: {0}")]
    Storage(#[from] antfarm_storage::StoreError),

    #[error("workflow spec error: {0}")]
    Spec(#[from] antfarm_pipeline::PipelineError),
}
