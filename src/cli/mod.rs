//! Command-line interface definitions for the `shardcheck` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `shardcheck` binary.
#[derive(Debug, Parser)]
#[command(
    name = "shardcheck",
    about = "Walk a remote database through the removable shard lifecycle",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Raise log verbosity to debug (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    pub(crate) verbose: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Subcommands understood by `shardcheck`.
#[derive(Debug, clap::Subcommand)]
pub(crate) enum Command {
    /// Connect over SSH and run the shard lifecycle cases in order.
    #[command(
        name = "run",
        about = "Connect over SSH and run the shard lifecycle cases in order"
    )]
    Run(RunCommand),
    /// Print the numbered case list without connecting.
    #[command(name = "list", about = "Print the numbered case list without connecting")]
    List,
}

/// Arguments for the `shardcheck run` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RunCommand {
    /// Override the remote host from configuration for this run.
    ///
    /// The value replaces `host` after configuration files and
    /// `SHARDCHECK_HOST` have been merged.
    #[arg(long, value_name = "HOST")]
    pub(crate) host: Option<String>,
}
