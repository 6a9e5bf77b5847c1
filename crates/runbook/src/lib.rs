// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! antfarm-runbook: the workflow-definition file format.
//!
//! A workflow is a declarative TOML file naming a set of agents and an
//! ordered list of steps. This crate owns parsing and validation only; it
//! never touches the Store. The Workflow Spec Cache (in `antfarm-pipeline`)
//! owns loading these from disk with TTL/digest invalidation.

mod digest;
mod error;
mod spec;

pub use digest::content_digest;
pub use error::RunbookError;
pub use spec::{AgentDef, LoopConfigSpec, StepDef, StepKind, ThinkingLevel, WorkflowSpec};
