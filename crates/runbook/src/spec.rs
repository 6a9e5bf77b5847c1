// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::RunbookError;

/// An agent declared by a workflow, naming where `peekAndSpawn` should
/// dispatch work for any step that claims it.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Per-step duration budget (§4.6, §5); the Sweeper reaps steps idle
    /// beyond `timeoutSeconds + 5 min`. A workflow-level polling timeout is
    /// not consulted (§9 open question resolved against it).
    #[serde(rename = "timeoutSeconds", alias = "timeout_seconds", default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// How much of its reasoning the spawned worker should surface.
    #[serde(default)]
    pub thinking: ThinkingLevel,
}

fn default_timeout_seconds() -> u64 {
    3600
}

/// Mirrors `antfarm_gateway::ThinkingLevel` so `antfarm-runbook` does not
/// have to depend on the gateway crate just to parse this one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Off,
    Minimal,
    Low,
    Medium,
    High,
}

impl Default for ThinkingLevel {
    fn default() -> Self {
        Self::Medium
    }
}

/// Whether a step runs once (`Single`) or drives a story-by-story loop
/// (`Loop`), mirroring `antfarm_core::StepType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Single,
    Loop,
}

impl Default for StepKind {
    fn default() -> Self {
        Self::Single
    }
}

/// Loop-step configuration as it appears in the TOML file.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct LoopConfigSpec {
    #[serde(default)]
    pub verify_each: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepDef {
    pub id: String,
    pub index: u32,
    pub agent: String,
    pub input: String,
    #[serde(default)]
    pub expects: String,
    #[serde(rename = "type", default)]
    pub kind: StepKind,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(rename = "loop")]
    pub loop_config: Option<LoopConfigSpec>,
    pub verify_step: Option<String>,
}

fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Deserialize)]
struct WorkflowMeta {
    id: String,
    #[serde(default)]
    name: String,
}

/// A fully parsed and validated workflow definition.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowSpec {
    workflow: WorkflowMeta,
    #[serde(default, rename = "agents")]
    agents: Vec<AgentDef>,
    #[serde(default, rename = "steps")]
    steps: Vec<StepDef>,
}

impl WorkflowSpec {
    pub fn id(&self) -> &str {
        &self.workflow.id
    }

    pub fn name(&self) -> &str {
        &self.workflow.name
    }

    pub fn agents(&self) -> &[AgentDef] {
        &self.agents
    }

    pub fn steps(&self) -> &[StepDef] {
        &self.steps
    }

    /// Steps in execution order (by `index`). Callers should not assume the
    /// on-disk order already matches; `load` validates density but not
    /// sortedness.
    pub fn steps_in_order(&self) -> Vec<&StepDef> {
        let mut ordered: Vec<&StepDef> = self.steps.iter().collect();
        ordered.sort_by_key(|s| s.index);
        ordered
    }

    /// Parse and validate a workflow spec from a file path.
    pub fn load(path: &Path) -> Result<Self, RunbookError> {
        let bytes = std::fs::read(path).map_err(|source| RunbookError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&bytes, &path.display().to_string())
    }

    /// Parse and validate a workflow spec from raw TOML bytes. `origin` is
    /// used only for error messages.
    pub fn parse(bytes: &[u8], origin: &str) -> Result<Self, RunbookError> {
        let text = String::from_utf8_lossy(bytes);
        let spec: WorkflowSpec =
            toml::from_str(&text).map_err(|source| RunbookError::Parse {
                path: origin.to_string(),
                source,
            })?;
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<(), RunbookError> {
        if self.steps.is_empty() {
            return Err(RunbookError::NoSteps);
        }

        let mut seen_ids = HashSet::with_capacity(self.steps.len());
        for step in &self.steps {
            if !seen_ids.insert(step.id.as_str()) {
                return Err(RunbookError::DuplicateStepId(step.id.clone()));
            }
        }

        let mut indexes: Vec<u32> = self.steps.iter().map(|s| s.index).collect();
        indexes.sort_unstable();
        let dense = indexes.iter().enumerate().all(|(i, idx)| i as u32 == *idx);
        if !dense {
            return Err(RunbookError::NonDenseStepIndex(indexes));
        }

        let agent_ids: HashSet<&str> = self.agents.iter().map(|a| a.id.as_str()).collect();
        for step in &self.steps {
            if !agent_ids.contains(step.agent.as_str()) {
                return Err(RunbookError::UnknownAgent {
                    step: step.id.clone(),
                    agent: step.agent.clone(),
                });
            }
        }

        let step_ids: HashSet<&str> = self.steps.iter().map(|s| s.id.as_str()).collect();
        for step in &self.steps {
            if let Some(verify_step) = &step.verify_step {
                if !step_ids.contains(verify_step.as_str()) {
                    return Err(RunbookError::UnknownVerifyStep {
                        step: step.id.clone(),
                        verify_step: verify_step.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}
