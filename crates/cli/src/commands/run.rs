// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `antfarm run start` - create a run and its steps from a workflow spec.

use std::collections::HashMap;
use std::path::PathBuf;

use antfarm_core::{
    AgentId, Clock, Event, EventKind, LoopConfig, Run, RunId, Scheduler, Step, StepId, StepStatus,
    StepType, SystemClock,
};
use antfarm_daemon::Config;
use antfarm_events::{Journal, WebhookSink};
use antfarm_runbook::{StepKind, WorkflowSpec};
use antfarm_storage::Store;
use clap::Args;

use crate::exit_error::ExitError;
use crate::output::{format_or_json, OutputFormat};

#[derive(Args)]
pub struct StartArgs {
    /// Path to the workflow spec TOML.
    pub workflow: PathBuf,
    /// Free-text task description, interpolated into step input templates.
    pub task: String,
    /// Webhook URL notified on every event this run produces.
    #[arg(long)]
    pub notify_url: Option<String>,
    /// Who drives this run's steps forward.
    #[arg(long, value_enum, default_value = "cron")]
    pub scheduler: SchedulerArg,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum SchedulerArg {
    Cron,
    Daemon,
}

impl From<SchedulerArg> for Scheduler {
    fn from(value: SchedulerArg) -> Self {
        match value {
            SchedulerArg::Cron => Scheduler::Cron,
            SchedulerArg::Daemon => Scheduler::Daemon,
        }
    }
}

pub async fn start(args: StartArgs, format: OutputFormat) -> Result<(), ExitError> {
    let spec = WorkflowSpec::load(&args.workflow)
        .map_err(|e| ExitError::new(1, format!("failed to load workflow spec: {e}")))?;
    let config = Config::load().map_err(|e| ExitError::new(1, format!("{e}")))?;
    std::fs::create_dir_all(&config.state_dir).map_err(|e| ExitError::new(1, format!("{e}")))?;

    let mut store =
        Store::open(&config.db_path).map_err(|e| ExitError::new(1, format!("failed to open store: {e}")))?;
    let journal = Journal::open(&config.journal_path);

    let clock = SystemClock;
    let now = clock.now_iso8601();
    let run_number = store.state().all_runs().count() as u64 + 1;

    let run = Run {
        id: RunId::new(),
        run_number,
        workflow_id: spec.id().to_string(),
        task: args.task,
        status: antfarm_core::RunStatus::Running,
        context: HashMap::new(),
        notify_url: args.notify_url.clone(),
        scheduler: args.scheduler.into(),
        created_at: now.clone(),
        updated_at: now.clone(),
    };

    let steps: Vec<Step> = spec
        .steps_in_order()
        .into_iter()
        .enumerate()
        .map(|(position, def)| Step {
            id: StepId::new(),
            run_id: run.id,
            step_id: def.id.clone(),
            agent_id: AgentId::from_string(def.agent.clone()),
            step_index: def.index,
            input_template: def.input.clone(),
            expects: def.expects.clone(),
            kind: match def.kind {
                StepKind::Single => StepType::Single,
                StepKind::Loop => StepType::Loop,
            },
            loop_config: match def.kind {
                StepKind::Loop => Some(LoopConfig {
                    verify_each: def.loop_config.map(|c| c.verify_each).unwrap_or(false),
                }),
                StepKind::Single => None,
            },
            max_retries: def.max_retries,
            retry_count: 0,
            abandoned_count: 0,
            status: if position == 0 { StepStatus::Pending } else { StepStatus::Waiting },
            current_story_id: None,
            output: None,
            created_at: now.clone(),
            updated_at: now.clone(),
        })
        .collect();

    store
        .with_transaction::<_, antfarm_storage::StoreError>(|txn| {
            txn.put_run(run.clone());
            for step in steps {
                txn.insert_step(step)?;
            }
            Ok(())
        })
        .map_err(|e| ExitError::new(1, format!("failed to persist run: {e}")))?;

    let event = Event::new(EventKind::RunStarted, run.id).workflow_id(run.workflow_id.clone()).with_ts(now);
    journal.emit(&event);
    if let Some(url) = &run.notify_url {
        WebhookSink::new(url.clone()).dispatch_and_wait(event).await;
    }

    format_or_json(format, &serde_json::json!({ "runId": run.id.to_string(), "runNumber": run.run_number }), || {
        println!("Run {} started ({})", run.id, run.workflow_id)
    })
    .map_err(|e| ExitError::new(1, format!("{e}")))
}
