// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Step` row: one ordered unit of work within a run.

use crate::ids::{AgentId, RunId, StepId, StoryId};
use crate::status::{StepStatus, StepType};
use serde::{Deserialize, Serialize};

/// One ordered unit of work within a run, owned by a single agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub run_id: RunId,
    /// Human-readable name, unique within the run (the name used in the
    /// workflow spec and in `input_template` resolution).
    pub step_id: String,
    pub agent_id: AgentId,
    /// 0-based, dense within the run.
    pub step_index: u32,
    pub input_template: String,
    /// Informational only — never checked by the engine.
    pub expects: String,
    #[serde(rename = "type")]
    pub kind: StepType,
    /// Only set when `kind == Loop`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_config: Option<LoopConfig>,
    pub max_retries: u32,
    pub retry_count: u32,
    pub abandoned_count: u32,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_story_id: Option<StoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Step {
    pub fn is_loop(&self) -> bool {
        matches!(self.kind, StepType::Loop)
    }
}

/// Loop-step configuration, copied from the workflow spec's `AgentDef`/
/// `StepDef` at step-creation time so the engine never has to re-resolve
/// the spec mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    pub verify_each: bool,
    /// Abandonment cap is fixed at 5 per spec §4.5/§7; not configurable.
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self { verify_each: false }
    }
}

crate::builder! {
    pub struct StepBuilder => Step {
        computed { id: StepId = StepId::new() }
        computed { run_id: RunId = RunId::new() }
        into { step_id: String = "step" }
        computed { agent_id: AgentId = AgentId::new() }
        set { step_index: u32 = 0 }
        into { input_template: String = "" }
        into { expects: String = "" }
        set { kind: StepType = StepType::Single }
        option { loop_config: LoopConfig = None }
        set { max_retries: u32 = 2 }
        set { retry_count: u32 = 0 }
        set { abandoned_count: u32 = 0 }
        set { status: StepStatus = StepStatus::Waiting }
        option { current_story_id: StoryId = None }
        option { output: String = None }
        into { created_at: String = "2024-01-01T00:00:00Z" }
        into { updated_at: String = "2024-01-01T00:00:00Z" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_default_is_single_waiting() {
        let step = Step::builder().build();
        assert_eq!(step.kind, StepType::Single);
        assert_eq!(step.status, StepStatus::Waiting);
        assert!(!step.is_loop());
    }

    #[test]
    fn loop_step_carries_config() {
        let step = Step::builder()
            .kind(StepType::Loop)
            .loop_config(LoopConfig { verify_each: true })
            .build();
        assert!(step.is_loop());
        assert!(step.loop_config.unwrap().verify_each);
    }
}
