// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The wire shapes of the worker spawn protocol (§6).

use serde::{Deserialize, Serialize};

/// How much of its reasoning the worker should surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Off,
    Minimal,
    Low,
    Medium,
    High,
}

antfarm_core::simple_display! {
    ThinkingLevel {
        Off => "off",
        Minimal => "minimal",
        Low => "low",
        Medium => "medium",
        High => "high",
    }
}

/// A "call agent" request to the Gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnRequest {
    #[serde(rename = "idempotencyKey")]
    pub idempotency_key: String,
    #[serde(rename = "agentId")]
    pub agent_id: String,
    #[serde(rename = "sessionKey")]
    pub session_key: String,
    pub message: String,
    pub timeout: u64,
    pub thinking: ThinkingLevel,
}

impl SpawnRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        idempotency_key: impl Into<String>,
        agent_id: impl Into<String>,
        session_key: impl Into<String>,
        message: impl Into<String>,
        timeout: u64,
        thinking: ThinkingLevel,
    ) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            agent_id: agent_id.into(),
            session_key: session_key.into(),
            message: message.into(),
            timeout,
            thinking,
        }
    }
}

/// Gateway's immediate reply to a spawn request. Any other shape, or a
/// non-success HTTP status, is a spawn failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnResponse {
    pub status: String,
    #[serde(rename = "runId")]
    pub run_id: String,
}

impl SpawnResponse {
    pub fn is_accepted(&self) -> bool {
        self.status == "accepted"
    }
}

/// Reply to a status poll: the Gateway's own session identity for a
/// previously accepted run, once it has resolved one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_request_serializes_with_wire_field_names() {
        let request = SpawnRequest::new(
            "antfarm:run-a:stp-b:root:nonce1",
            "workflow_reviewer",
            "agent:agt-1:workflow:run-a:stp-b",
            "do the thing",
            3600,
            ThinkingLevel::Medium,
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["idempotencyKey"], "antfarm:run-a:stp-b:root:nonce1");
        assert_eq!(json["agentId"], "workflow_reviewer");
        assert_eq!(json["sessionKey"], "agent:agt-1:workflow:run-a:stp-b");
        assert_eq!(json["thinking"], "medium");
    }

    #[test]
    fn spawn_response_accepted_status() {
        let accepted: SpawnResponse =
            serde_json::from_str(r#"{"status":"accepted","runId":"abc"}"#).unwrap();
        assert!(accepted.is_accepted());

        let other: SpawnResponse =
            serde_json::from_str(r#"{"status":"rejected","runId":"abc"}"#).unwrap();
        assert!(!other.is_accepted());
    }
}
