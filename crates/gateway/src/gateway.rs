// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Gateway` abstraction: the external service that launches workers on
//! request and surfaces their session identity (§6). The Pipeline/Spawner
//! crates depend only on this trait, never on a concrete transport.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::GatewayError;
use crate::protocol::{SpawnRequest, SpawnResponse};

/// Polling cadence for resolving the real session id after a spawn is
/// accepted (§4.6): up to 5 attempts, 1 second apart.
pub const STATUS_POLL_ATTEMPTS: u32 = 5;
pub const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    /// Submit a worker spawn request. A non-`accepted` response, or any
    /// transport failure, is a spawn failure to the caller.
    async fn call_agent(&self, request: &SpawnRequest) -> Result<SpawnResponse, GatewayError>;

    /// Check whether the Gateway has resolved a session id for a
    /// previously accepted run. `Ok(None)` means not yet resolved.
    async fn poll_status(&self, accepted_run_id: &str) -> Result<Option<String>, GatewayError>;

    /// Resolve the real session UUID for an accepted run, polling up to
    /// [`STATUS_POLL_ATTEMPTS`] times. Falls back to the accepted `runId`
    /// if the Gateway never resolves one within the retry budget — the
    /// Spawner must always get *some* session identity to record.
    async fn resolve_session_id(&self, accepted_run_id: &str) -> String {
        for attempt in 0..STATUS_POLL_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(STATUS_POLL_INTERVAL).await;
            }
            match self.poll_status(accepted_run_id).await {
                Ok(Some(session_id)) => return session_id,
                Ok(None) => continue,
                Err(err) => {
                    tracing::debug!(error = %err, attempt, "gateway status poll failed");
                }
            }
        }
        accepted_run_id.to_string()
    }
}
