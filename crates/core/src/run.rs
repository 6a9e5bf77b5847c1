// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Run` row: one execution of a workflow for a particular task.

use crate::ids::RunId;
use crate::status::{RunStatus, Scheduler};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One execution of a workflow for a particular task.
///
/// Created by an external "start run" caller; mutated only by the Pipeline
/// Engine. Terminal statuses (`completed`, `failed`, `cancelled`) are
/// absorbing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    /// Monotonic, assigned at creation; used for deterministic ordering.
    pub run_number: u64,
    pub workflow_id: String,
    pub task: String,
    pub status: RunStatus,
    pub context: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_url: Option<String>,
    pub scheduler: Scheduler,
    pub created_at: String,
    pub updated_at: String,
}

impl Run {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

crate::builder! {
    pub struct RunBuilder => Run {
        computed { id: RunId = RunId::new() }
        set { run_number: u64 = 1 }
        into { workflow_id: String = "wf" }
        into { task: String = "task" }
        set { status: RunStatus = RunStatus::Running }
        computed { context: HashMap<String, String> = HashMap::new() }
        option { notify_url: String = None }
        set { scheduler: Scheduler = Scheduler::Daemon }
        into { created_at: String = "2024-01-01T00:00:00Z" }
        into { updated_at: String = "2024-01-01T00:00:00Z" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_to_running_daemon_run() {
        let run = Run::builder().build();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.scheduler, Scheduler::Daemon);
        assert!(!run.is_terminal());
    }
}
