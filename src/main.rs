//! Binary entry point for the `shardcheck` CLI.

mod cli;

use std::io::{self, Write};
use std::process;

use clap::Parser;
use shell_escape::unix::escape;
use thiserror::Error;
use tracing::{debug, info, warn};

use cli::{Cli, Command, RunCommand};
use shardcheck::{
    CaseRunner, ConfigError, ConnectionConfig, OperatorGate, RemoteError, RunnerError, SshSession,
    describe, logging, shard_lifecycle_cases,
};

/// Exit status for ordinary fatal errors.
const FAILURE_EXIT_CODE: i32 = 1;

/// Exit status for a reply whose `returnValue` was not true.
const HARD_FAILURE_EXIT_CODE: i32 = 2;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("connection error: {0}")]
    Remote(#[from] RemoteError),
    #[error("run failed: {0}")]
    Runner(#[from] RunnerError),
}

impl CliError {
    const fn exit_code(&self) -> i32 {
        if matches!(self, Self::Runner(err) if err.is_hard_failure()) {
            HARD_FAILURE_EXIT_CODE
        } else {
            FAILURE_EXIT_CODE
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let exit_code = match dispatch(cli.command).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            err.exit_code()
        }
    };

    process::exit(exit_code);
}

async fn dispatch(command: Command) -> Result<(), CliError> {
    match command {
        Command::Run(args) => run_command(args).await,
        Command::List => {
            write_case_list(io::stdout());
            Ok(())
        }
    }
}

async fn run_command(args: RunCommand) -> Result<(), CliError> {
    let mut config = ConnectionConfig::load_without_cli_args()?;
    apply_host_override(&mut config, args.host);
    debug!(?config, "resolved connection configuration");

    let session = SshSession::with_process_runner(config)?;
    session.connect()?;

    let mut runner = CaseRunner::new(session, OperatorGate::stdin());
    let outcome = runner.run(&shard_lifecycle_cases()).await;
    match outcome {
        Ok(summary) => {
            info!(completed = summary.completed, "all cases passed");
            close_quietly(runner.executor());
            Ok(())
        }
        // Exit straight away; the master connection is left to ControlPersist.
        Err(err) if err.is_hard_failure() => Err(err.into()),
        Err(err) => {
            close_quietly(runner.executor());
            Err(err.into())
        }
    }
}

fn apply_host_override(config: &mut ConnectionConfig, host: Option<String>) {
    if let Some(value) = host {
        config.host = value;
    }
}

fn close_quietly<R: shardcheck::CommandRunner>(session: &SshSession<R>) {
    if let Err(err) = session.close() {
        warn!(error = %err, "failed to close SSH master connection");
    }
}

fn write_case_list(mut target: impl Write) {
    for (id, name, command) in describe(&shard_lifecycle_cases()) {
        writeln!(target, "{id:>2}  {name}").ok();
        writeln!(target, "    {}", escape(command.into())).ok();
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
