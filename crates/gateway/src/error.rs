// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway rejected spawn: status={status} body={body}")]
    Rejected { status: u16, body: String },

    #[error("gateway returned an unexpected response: {0}")]
    UnexpectedResponse(String),
}
