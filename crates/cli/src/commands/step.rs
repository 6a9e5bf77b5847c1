// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `antfarm step complete`/`antfarm step fail` - the worker completion
//! protocol (spec §6). Workers never pass output as argv — `complete`
//! reads it from standard input to avoid quoting hazards.

use std::io::Read;

use antfarm_core::{StepId, SystemClock};
use antfarm_daemon::Config;
use antfarm_events::Journal;
use antfarm_pipeline::{PipelineEngine, SpecCache};
use antfarm_storage::Store;
use clap::Args;

use crate::exit_error::ExitError;
use crate::output::{format_or_json, OutputFormat};

#[derive(Args)]
pub struct CompleteArgs {
    pub step_id: String,
}

#[derive(Args)]
pub struct FailArgs {
    pub step_id: String,
    pub error: String,
}

pub fn complete(args: CompleteArgs, format: OutputFormat) -> Result<(), ExitError> {
    let mut output = String::new();
    std::io::stdin()
        .read_to_string(&mut output)
        .map_err(|e| ExitError::new(1, format!("failed to read step output from stdin: {e}")))?;

    let (mut store, journal, spec_cache) = open_run_state()?;
    let step_id = StepId::from_string(&args.step_id);
    let workflow_id = workflow_id_for(&store, &step_id)?;
    let spec = spec_cache.get_spec(&workflow_id).map_err(|e| ExitError::new(1, format!("{e}")))?;

    let outcome = PipelineEngine::new(&mut store, SystemClock)
        .with_journal(&journal)
        .complete_step(&step_id, &output, &spec)
        .map_err(|e| ExitError::new(1, format!("failed to complete step: {e}")))?;

    format_or_json(
        format,
        &serde_json::json!({ "advanced": outcome.advanced, "runCompleted": outcome.run_completed }),
        || println!("step {} completed", args.step_id),
    )
    .map_err(|e| ExitError::new(1, format!("{e}")))
}

pub fn fail(args: FailArgs, format: OutputFormat) -> Result<(), ExitError> {
    let (mut store, journal, _spec_cache) = open_run_state()?;
    let step_id = StepId::from_string(&args.step_id);

    let outcome = PipelineEngine::new(&mut store, SystemClock)
        .with_journal(&journal)
        .fail_step(&step_id, &args.error)
        .map_err(|e| ExitError::new(1, format!("failed to fail step: {e}")))?;

    format_or_json(
        format,
        &serde_json::json!({ "retrying": outcome.retrying, "runFailed": outcome.run_failed }),
        || println!("step {} failed: {}", args.step_id, args.error),
    )
    .map_err(|e| ExitError::new(1, format!("{e}")))
}

fn open_run_state() -> Result<(Store, Journal, SpecCache<SystemClock>), ExitError> {
    let config = Config::load().map_err(|e| ExitError::new(1, format!("{e}")))?;
    let store =
        Store::open(&config.db_path).map_err(|e| ExitError::new(1, format!("failed to open store: {e}")))?;
    let journal = Journal::open(&config.journal_path);
    let spec_cache = SpecCache::new(config.workflows_path, SystemClock);
    Ok((store, journal, spec_cache))
}

fn workflow_id_for(store: &Store, step_id: &StepId) -> Result<String, ExitError> {
    let step = store.state().step(step_id).ok_or_else(|| ExitError::new(1, format!("step not found: {step_id}")))?;
    let run = store
        .state()
        .run(&step.run_id)
        .ok_or_else(|| ExitError::new(1, format!("run not found: {}", step.run_id)))?;
    Ok(run.workflow_id.clone())
}
