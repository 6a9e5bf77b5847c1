// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway client over plain HTTP.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::protocol::{SpawnRequest, SpawnResponse, StatusResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Talks to a real Gateway over HTTP: one "call agent" endpoint to submit a
/// spawn, one status endpoint to resolve the session id it assigns.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, base_url: base_url.into().trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn call_agent(&self, request: &SpawnRequest) -> Result<SpawnResponse, GatewayError> {
        let url = format!("{}/v1/agents/call", self.base_url);
        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected { status: status.as_u16(), body });
        }
        let spawn_response: SpawnResponse = response.json().await?;
        if !spawn_response.is_accepted() {
            return Err(GatewayError::UnexpectedResponse(format!(
                "status={}",
                spawn_response.status
            )));
        }
        Ok(spawn_response)
    }

    async fn poll_status(&self, accepted_run_id: &str) -> Result<Option<String>, GatewayError> {
        let url = format!("{}/v1/agents/status/{}", self.base_url, accepted_run_id);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let status: StatusResponse = response.json().await?;
        Ok(status.session_id)
    }
}
