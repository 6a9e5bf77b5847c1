// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

mod commands;
mod exit_error;
mod output;

use clap::{Parser, Subcommand};
use exit_error::ExitError;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "antfarm", about = "Multi-agent workflow orchestration engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Output format for read-only commands.
    #[arg(long, value_enum, global = true, default_value = "text")]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Command {
    /// Manage runs.
    Run {
        #[command(subcommand)]
        command: RunCommand,
    },
    /// The worker completion protocol.
    Step {
        #[command(subcommand)]
        command: StepCommand,
    },
    /// Read-only overview of every run.
    Status(commands::status::StatusArgs),
    /// Read-only Event Journal queries.
    Events {
        #[command(subcommand)]
        command: EventsCommand,
    },
    /// Daemon process management.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

#[derive(Subcommand)]
enum RunCommand {
    /// Start a new run from a workflow spec.
    Start(commands::run::StartArgs),
}

#[derive(Subcommand)]
enum StepCommand {
    /// Report a step's output (read from stdin) as complete.
    Complete(commands::step::CompleteArgs),
    /// Report a step as failed.
    Fail(commands::step::FailArgs),
}

#[derive(Subcommand)]
enum EventsCommand {
    /// Show recent events.
    Tail(commands::events::TailArgs),
}

#[derive(Subcommand)]
enum DaemonCommand {
    /// Run the daemon in the foreground.
    Run,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = dispatch(cli).await {
        eprintln!("error: {e}");
        std::process::exit(e.code);
    }
}

async fn dispatch(cli: Cli) -> Result<(), ExitError> {
    match cli.command {
        Command::Run { command: RunCommand::Start(args) } => commands::run::start(args, cli.output).await,
        Command::Step { command: StepCommand::Complete(args) } => {
            let result = commands::step::complete(args, cli.output);
            settle_webhooks().await;
            result
        }
        Command::Step { command: StepCommand::Fail(args) } => {
            let result = commands::step::fail(args, cli.output);
            settle_webhooks().await;
            result
        }
        Command::Status(args) => commands::status::handle(args, cli.output),
        Command::Events { command: EventsCommand::Tail(args) } => commands::events::tail(args, cli.output),
        Command::Daemon { command: DaemonCommand::Run } => commands::daemon::run(),
    }
}

/// `step complete`/`step fail` drive the Pipeline Engine, which dispatches
/// webhooks as detached tasks. Give one a moment to actually leave before
/// this short-lived process exits and the runtime drops them mid-flight.
async fn settle_webhooks() {
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
}
