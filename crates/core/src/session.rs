// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ActiveSession`: a worker believed to be running right now.

use crate::ids::{AgentId, RunId, SessionId, StepId};
use serde::{Deserialize, Serialize};

/// Who caused a worker to be spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnedBy {
    Daemon,
    Cron,
}

crate::simple_display! {
    SpawnedBy {
        Daemon => "daemon",
        Cron => "cron",
    }
}

/// Composite key identifying one active worker: `(agent_id, step_id,
/// story_id)`, with an empty string standing in for "no story" so the key
/// collates the same way whether or not a story is involved (§3, §9 open
/// question on the `NULL` → `""` migration).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub agent_id: AgentId,
    pub step_id: StepId,
    /// Empty string when the session is not scoped to a story.
    pub story_id: String,
}

impl SessionKey {
    pub fn for_step(agent_id: AgentId, step_id: StepId) -> Self {
        Self { agent_id, step_id, story_id: String::new() }
    }

    pub fn for_story(agent_id: AgentId, step_id: StepId, story_id: impl Into<String>) -> Self {
        Self { agent_id, step_id, story_id: story_id.into() }
    }
}

/// A worker believed to be running. Written only by the Spawner (on spawn
/// success); removed only by the Spawner's rollback path, by explicit
/// completion, or by the Sweeper's staleness/GC passes — never by the
/// Pipeline Engine directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub key: SessionKey,
    pub run_id: RunId,
    pub spawned_at: String,
    pub spawned_by: SpawnedBy,
    pub session_id: SessionId,
}
