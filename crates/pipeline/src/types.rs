// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Return shapes for the Pipeline Engine's operations (§4.4 contract).

use antfarm_core::{AgentId, RunId, StepId, StoryId};

/// What `claimStep`/`claimStory` hand back on a successful claim: enough to
/// let the Spawner build a worker prompt without touching the Store again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimResult {
    pub run_id: RunId,
    pub step_id: StepId,
    pub story_id: Option<StoryId>,
    pub agent_id: AgentId,
    pub resolved_input: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompleteOutcome {
    pub advanced: bool,
    pub run_completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailOutcome {
    pub retrying: bool,
    pub run_failed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdvanceOutcome {
    pub advanced: bool,
    pub run_completed: bool,
}
