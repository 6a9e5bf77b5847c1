// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-effort webhook fan-out for journal events.

use std::time::Duration;

use antfarm_core::Event;

const DISPATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// A configured webhook target plus the HTTP client used to reach it.
///
/// A bearer token may be smuggled in via a `#auth=<token>` URL fragment so
/// it never has to appear in a config file's plaintext `url` field; the
/// fragment is stripped before the URL is stored or logged anywhere, and
/// the token is sent as an `Authorization: Bearer` header instead.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
    bearer: Option<String>,
}

impl WebhookSink {
    pub fn new(raw_url: impl Into<String>) -> Self {
        let (url, bearer) = split_auth_fragment(&raw_url.into());
        let client = reqwest::Client::builder()
            .timeout(DISPATCH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, url, bearer }
    }

    /// URL with any `#auth=...` fragment already stripped — safe to log.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fire the event at the configured webhook. Never blocks the caller
    /// and never surfaces a failure: if no Tokio runtime is reachable (e.g.
    /// called from a synchronous test), the dispatch is skipped; otherwise
    /// it runs on a detached task and a failed request is only logged.
    pub fn dispatch(&self, event: Event) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no tokio runtime reachable, skipping webhook dispatch");
            return;
        };

        let client = self.client.clone();
        let url = self.url.clone();
        let bearer = self.bearer.clone();

        handle.spawn(async move { Self::send(client, url, bearer, event).await });
    }

    /// Like [`dispatch`](Self::dispatch), but awaits the request instead of
    /// detaching it. For callers (the worker-facing CLI) that exit right
    /// after emitting an event, where a spawned task would race process
    /// shutdown and could be dropped before the request ever leaves.
    pub async fn dispatch_and_wait(&self, event: Event) {
        Self::send(self.client.clone(), self.url.clone(), self.bearer.clone(), event).await;
    }

    async fn send(client: reqwest::Client, url: String, bearer: Option<String>, event: Event) {
        let mut request = client.post(&url).json(&event);
        if let Some(token) = &bearer {
            request = request.bearer_auth(token);
        }
        match request.send().await {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(url = %url, status = %response.status(), "webhook rejected event");
            }
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "webhook dispatch failed");
            }
            Ok(_) => {}
        }
    }
}

fn split_auth_fragment(raw: &str) -> (String, Option<String>) {
    match raw.split_once('#') {
        Some((base, fragment)) => match fragment.strip_prefix("auth=") {
            Some(token) => (base.to_string(), Some(token.to_string())),
            None => (base.to_string(), None),
        },
        None => (raw.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_auth_fragment_and_extracts_bearer() {
        let (url, bearer) = split_auth_fragment("https://example.com/hook#auth=s3cr3t");
        assert_eq!(url, "https://example.com/hook");
        assert_eq!(bearer.as_deref(), Some("s3cr3t"));
    }

    #[test]
    fn leaves_url_without_fragment_untouched() {
        let (url, bearer) = split_auth_fragment("https://example.com/hook");
        assert_eq!(url, "https://example.com/hook");
        assert!(bearer.is_none());
    }

    #[test]
    fn sink_url_never_carries_the_fragment() {
        let sink = WebhookSink::new("https://example.com/hook#auth=s3cr3t");
        assert_eq!(sink.url(), "https://example.com/hook");
    }

    #[test]
    fn dispatch_without_a_runtime_does_not_panic() {
        let sink = WebhookSink::new("https://example.invalid/hook");
        let event = Event::new(antfarm_core::EventKind::RunStarted, antfarm_core::RunId::new());
        sink.dispatch(event);
    }

    #[tokio::test]
    async fn dispatch_and_wait_completes_before_returning() {
        let sink = WebhookSink::new("https://example.invalid/hook");
        let event = Event::new(antfarm_core::EventKind::RunStarted, antfarm_core::RunId::new());
        sink.dispatch_and_wait(event).await;
    }
}
