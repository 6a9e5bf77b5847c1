// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `antfarm events tail` - read-only Event Journal query.

use antfarm_daemon::Config;
use antfarm_events::Journal;
use clap::Args;

use crate::exit_error::ExitError;
use crate::output::{format_or_json, OutputFormat};

#[derive(Args)]
pub struct TailArgs {
    /// Only events whose run id starts with this prefix.
    #[arg(long)]
    pub run: Option<String>,
    /// Number of most recent events to show.
    #[arg(long, short = 'n', default_value = "50")]
    pub limit: usize,
}

pub fn tail(args: TailArgs, format: OutputFormat) -> Result<(), ExitError> {
    let config = Config::load().map_err(|e| ExitError::new(1, format!("{e}")))?;
    let journal = Journal::open(&config.journal_path);

    let events = match &args.run {
        Some(prefix) => journal.by_run(prefix, args.limit),
        None => journal.recent(args.limit),
    }
    .map_err(|e| ExitError::new(1, format!("failed to read event journal: {e}")))?;

    format_or_json(format, &events, || {
        if events.is_empty() {
            println!("No events found");
        }
        for event in &events {
            println!("{} {} run={}", event.ts, event.event, event.run_id);
        }
    })
    .map_err(|e| ExitError::new(1, format!("{e}")))
}
