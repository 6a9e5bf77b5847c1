// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The journal `Event` enum (§6): the enumerated event types emitted at
//! every state transition and appended to the Event Journal.

use crate::ids::{AgentId, RunId, SessionId, StepId, StoryId};
use serde::{Deserialize, Serialize};

/// One journal record. Serializes as `{"event": "run.started", ...}`;
/// unknown fields are simply absent rather than erroring, so the journal
/// format can grow without a migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub ts: String,
    pub event: EventKind,
    pub run_id: RunId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_id: Option<StoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Event {
    pub fn new(event: EventKind, run_id: RunId) -> Self {
        Self {
            ts: String::new(),
            event,
            run_id,
            workflow_id: None,
            step_id: None,
            agent_id: None,
            story_id: None,
            story_title: None,
            session_id: None,
            detail: None,
        }
    }

    pub fn with_ts(mut self, ts: impl Into<String>) -> Self {
        self.ts = ts.into();
        self
    }

    crate::setters! {
        into { workflow_id: String }
        option { step_id: StepId }
        option { agent_id: AgentId }
        option { story_id: StoryId }
        into { story_title: String }
        option { session_id: SessionId }
        into { detail: String }
    }
}

/// Enumerated event types (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    #[serde(rename = "run.started")]
    RunStarted,
    #[serde(rename = "run.completed")]
    RunCompleted,
    #[serde(rename = "run.failed")]
    RunFailed,
    #[serde(rename = "step.pending")]
    StepPending,
    #[serde(rename = "step.claimed")]
    StepClaimed,
    #[serde(rename = "step.running")]
    StepRunning,
    #[serde(rename = "step.done")]
    StepDone,
    #[serde(rename = "step.failed")]
    StepFailed,
    #[serde(rename = "step.timeout")]
    StepTimeout,
    #[serde(rename = "step.rollback")]
    StepRollback,
    #[serde(rename = "story.claimed")]
    StoryClaimed,
    #[serde(rename = "story.started")]
    StoryStarted,
    #[serde(rename = "story.done")]
    StoryDone,
    #[serde(rename = "story.verified")]
    StoryVerified,
    #[serde(rename = "story.retry")]
    StoryRetry,
    #[serde(rename = "story.failed")]
    StoryFailed,
    #[serde(rename = "story.rollback")]
    StoryRollback,
    #[serde(rename = "pipeline.advanced")]
    PipelineAdvanced,
}

crate::simple_display! {
    EventKind {
        RunStarted => "run.started",
        RunCompleted => "run.completed",
        RunFailed => "run.failed",
        StepPending => "step.pending",
        StepClaimed => "step.claimed",
        StepRunning => "step.running",
        StepDone => "step.done",
        StepFailed => "step.failed",
        StepTimeout => "step.timeout",
        StepRollback => "step.rollback",
        StoryClaimed => "story.claimed",
        StoryStarted => "story.started",
        StoryDone => "story.done",
        StoryVerified => "story.verified",
        StoryRetry => "story.retry",
        StoryFailed => "story.failed",
        StoryRollback => "story.rollback",
        PipelineAdvanced => "pipeline.advanced",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_tagged_kind() {
        let event = Event::new(EventKind::StepDone, RunId::from_string("run-x"))
            .detail("STATUS: done")
            .step_id(StepId::from_string("stp-a"));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"step.done\""));
        assert!(json.contains("STATUS: done"));
    }

    #[test]
    fn display_matches_wire_name() {
        assert_eq!(EventKind::PipelineAdvanced.to_string(), "pipeline.advanced");
    }
}
