// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `antfarm status` - read-only overview of every run in the Store.
//! Never mutates state, mirroring the teacher's query-only command shape.

use antfarm_daemon::Config;
use antfarm_storage::Store;
use clap::Args;
use serde::Serialize;

use crate::exit_error::ExitError;
use crate::output::{format_or_json, OutputFormat};

#[derive(Args, Default)]
pub struct StatusArgs {
    /// Restrict to a single run id.
    pub run_id: Option<String>,
}

#[derive(Serialize)]
struct RunSummary {
    id: String,
    run_number: u64,
    workflow_id: String,
    status: String,
    steps_done: usize,
    steps_total: usize,
}

pub fn handle(args: StatusArgs, format: OutputFormat) -> Result<(), ExitError> {
    let config = Config::load().map_err(|e| ExitError::new(1, format!("{e}")))?;
    let store =
        Store::open(&config.db_path).map_err(|e| ExitError::new(1, format!("failed to open store: {e}")))?;

    let mut runs: Vec<RunSummary> = store
        .state()
        .all_runs()
        .filter(|run| args.run_id.as_deref().map(|id| run.id == *id).unwrap_or(true))
        .map(|run| {
            let steps = store.state().steps_for_run(&run.id);
            let steps_done = steps.iter().filter(|s| s.status == antfarm_core::StepStatus::Done).count();
            RunSummary {
                id: run.id.to_string(),
                run_number: run.run_number,
                workflow_id: run.workflow_id.clone(),
                status: run.status.to_string(),
                steps_done,
                steps_total: steps.len(),
            }
        })
        .collect();
    runs.sort_by_key(|r| r.run_number);

    format_or_json(format, &runs, || {
        if runs.is_empty() {
            println!("No runs found");
        }
        for run in &runs {
            println!(
                "{} [{}] {} — {}/{} steps done ({})",
                run.id, run.run_number, run.workflow_id, run.steps_done, run.steps_total, run.status
            );
        }
    })
    .map_err(|e| ExitError::new(1, format!("{e}")))
}
