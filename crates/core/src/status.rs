// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status enums for runs, steps, and stories.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// Status of a [`crate::Run`]. Terminal statuses are absorbing: once a run
/// reaches one, no operation transitions it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
    }
}

crate::simple_display! {
    RunStatus {
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// Who drives a run's steps: the external cron fabric, or this daemon.
///
/// A `null` scheduler on a stored run is treated as `Cron` (§3, Run
/// attributes) — the core specified here only acts on `Daemon`-scheduled
/// runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Scheduler {
    #[default]
    Cron,
    Daemon,
}

crate::simple_display! {
    Scheduler {
        Cron => "cron",
        Daemon => "daemon",
    }
}

impl std::str::FromStr for Scheduler {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "cron" => Ok(Scheduler::Cron),
            "daemon" => Ok(Scheduler::Daemon),
            other => Err(CoreError::InvalidScheduler(other.to_string())),
        }
    }
}

/// Whether a step is a single-shot unit of work or a story-iterating loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Single,
    Loop,
}

crate::simple_display! {
    StepType {
        Single => "single",
        Loop => "loop",
    }
}

/// Status of a [`crate::Step`].
///
/// `type=single` lifecycle: `Waiting -> Pending -> Claiming -> Running ->
/// Done|Failed`, with `Failed -> Pending` on retry.
///
/// `type=loop` reuses the same outer states; `current_story_id` tracks which
/// story is in flight while the step itself stays `Running` across many
/// story executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Waiting,
    Pending,
    Claiming,
    Running,
    Done,
    Failed,
}

impl StepStatus {
    /// Backward transitions are the only non-monotone edges in the state
    /// machine: `claiming -> pending` (spawn-failure rollback) and
    /// `failed -> pending` (retry).
    pub fn is_backward_transition(from: StepStatus, to: StepStatus) -> bool {
        matches!(
            (from, to),
            (StepStatus::Claiming, StepStatus::Pending) | (StepStatus::Failed, StepStatus::Pending)
        )
    }
}

crate::simple_display! {
    StepStatus {
        Waiting => "waiting",
        Pending => "pending",
        Claiming => "claiming",
        Running => "running",
        Done => "done",
        Failed => "failed",
    }
}

/// Status of a [`crate::Story`]. Mirrors [`StepStatus`] minus `Waiting`
/// (stories are ingested directly into `Pending`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    Pending,
    Claiming,
    Running,
    Done,
    Failed,
}

crate::simple_display! {
    StoryStatus {
        Pending => "pending",
        Claiming => "claiming",
        Running => "running",
        Done => "done",
        Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_scheduler_is_cron() {
        assert_eq!("".parse::<Scheduler>().unwrap(), Scheduler::Cron);
    }

    #[test]
    fn unknown_scheduler_is_rejected() {
        assert!("nightly".parse::<Scheduler>().is_err());
    }

    #[test]
    fn run_terminal_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }

    #[test]
    fn backward_transitions_are_named() {
        assert!(StepStatus::is_backward_transition(StepStatus::Claiming, StepStatus::Pending));
        assert!(StepStatus::is_backward_transition(StepStatus::Failed, StepStatus::Pending));
        assert!(!StepStatus::is_backward_transition(StepStatus::Pending, StepStatus::Claiming));
    }
}
