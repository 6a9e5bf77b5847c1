// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Return shape for `peekAndSpawn` (§4.6).

use antfarm_core::{AgentId, RunId, SessionId, StepId, StoryId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// Spawn accepted and confirmed; the step or story is now `running`.
    Spawned {
        run_id: RunId,
        step_id: StepId,
        story_id: Option<StoryId>,
        agent_id: AgentId,
        session_id: SessionId,
    },
    /// Nothing was claimed; no spawn was attempted.
    NotSpawned { reason: NotSpawnedReason },
    /// A claim was made but the spawn failed; the claim was rolled back.
    RolledBack {
        run_id: RunId,
        step_id: StepId,
        story_id: Option<StoryId>,
        error: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotSpawnedReason {
    /// Neither `claimStep` nor `claimStory` found claimable work.
    NoWork,
    /// The agent's loop step already has a story `running`/`claiming`.
    StoryAlreadyClaimed,
}

impl NotSpawnedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoWork => "no_work",
            Self::StoryAlreadyClaimed => "story_already_claimed",
        }
    }
}
