// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory `Gateway` for Spawner/Pipeline tests. Records every call and
//! lets the test script canned spawn/poll outcomes.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::protocol::{SpawnRequest, SpawnResponse};

/// One recorded `call_agent` invocation.
#[derive(Debug, Clone)]
pub struct GatewayCall {
    pub idempotency_key: String,
    pub agent_id: String,
    pub session_key: String,
}

enum SpawnOutcome {
    Accept(String),
    Reject(String),
}

pub struct FakeGateway {
    calls: Mutex<Vec<GatewayCall>>,
    spawn_outcomes: Mutex<Vec<SpawnOutcome>>,
    status_by_run: Mutex<std::collections::HashMap<String, String>>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            spawn_outcomes: Mutex::new(Vec::new()),
            status_by_run: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Queue an `{status:"accepted", runId}` response for the next spawn.
    pub fn queue_accept(&self, run_id: impl Into<String>) -> &Self {
        self.spawn_outcomes.lock().unwrap().push(SpawnOutcome::Accept(run_id.into()));
        self
    }

    /// Queue a spawn failure (transport error) for the next spawn.
    pub fn queue_reject(&self, reason: impl Into<String>) -> &Self {
        self.spawn_outcomes.lock().unwrap().push(SpawnOutcome::Reject(reason.into()));
        self
    }

    /// Make `poll_status(run_id)` resolve to `session_id` once called.
    pub fn set_resolved_session(&self, run_id: impl Into<String>, session_id: impl Into<String>) {
        self.status_by_run.lock().unwrap().insert(run_id.into(), session_id.into());
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn call_agent(&self, request: &SpawnRequest) -> Result<SpawnResponse, GatewayError> {
        self.calls.lock().unwrap().push(GatewayCall {
            idempotency_key: request.idempotency_key.clone(),
            agent_id: request.agent_id.clone(),
            session_key: request.session_key.clone(),
        });

        let outcome = self.spawn_outcomes.lock().unwrap().pop();
        match outcome {
            Some(SpawnOutcome::Accept(run_id)) => {
                Ok(SpawnResponse { status: "accepted".to_string(), run_id })
            }
            Some(SpawnOutcome::Reject(reason)) => {
                Err(GatewayError::Rejected { status: 503, body: reason })
            }
            None => Err(GatewayError::UnexpectedResponse(
                "FakeGateway has no queued spawn outcome".to_string(),
            )),
        }
    }

    async fn poll_status(&self, accepted_run_id: &str) -> Result<Option<String>, GatewayError> {
        Ok(self.status_by_run.lock().unwrap().get(accepted_run_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ThinkingLevel;

    fn request() -> SpawnRequest {
        SpawnRequest::new(
            "antfarm:run-a:stp-b:root:n1",
            "workflow_reviewer",
            "agent:agt-1:workflow:run-a:stp-b",
            "go",
            3600,
            ThinkingLevel::Low,
        )
    }

    #[tokio::test]
    async fn records_calls_and_replays_queued_accept() {
        let gateway = FakeGateway::new();
        gateway.queue_accept("accepted-run-1");

        let response = gateway.call_agent(&request()).await.unwrap();
        assert_eq!(response.run_id, "accepted-run-1");
        assert_eq!(gateway.calls().len(), 1);
        assert_eq!(gateway.calls()[0].agent_id, "workflow_reviewer");
    }

    #[tokio::test]
    async fn replays_queued_rejection() {
        let gateway = FakeGateway::new();
        gateway.queue_reject("gateway overloaded");

        let err = gateway.call_agent(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { .. }));
    }

    #[tokio::test]
    async fn poll_status_returns_configured_session() {
        let gateway = FakeGateway::new();
        gateway.set_resolved_session("accepted-run-1", "ses-real");

        let resolved = gateway.poll_status("accepted-run-1").await.unwrap();
        assert_eq!(resolved.as_deref(), Some("ses-real"));
    }

    #[tokio::test]
    async fn poll_status_unknown_run_is_none() {
        let gateway = FakeGateway::new();
        assert!(gateway.poll_status("no-such-run").await.unwrap().is_none());
    }
}
