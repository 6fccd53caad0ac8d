//! Command-line interface definitions for the `dropship` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

/// Top-level CLI for the `dropship` binary.
#[derive(Debug, Parser)]
#[command(
    name = "dropship",
    about = "Provision a host with a database, a cache and a web application over SSH",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Increase log output (`-v` for info, `-vv` for debug). `RUST_LOG`
    /// directives are honoured as well.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub(crate) verbose: u8,
    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// Subcommands of `dropship`.
#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Choose or create the host, then set up the database, cache and web app.
    #[command(
        name = "provision",
        about = "Choose or create the host, then set up the database, cache and web app"
    )]
    Provision,
    /// Run one tracked command on a host.
    #[command(name = "run", about = "Run one tracked command on a host")]
    Run(RunCommand),
    /// List the components recorded on a host.
    #[command(name = "list", about = "List the components recorded on a host")]
    List(ListCommand),
}

/// Arguments for the `dropship run` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RunCommand {
    /// Host address; defaults to `host_address` from configuration.
    #[arg(long, value_name = "ADDRESS")]
    pub(crate) address: Option<String>,
    /// Run the command even if the host recorded it as completed.
    #[arg(long)]
    pub(crate) force: bool,
    /// Command to execute on the remote host (use -- to separate flags).
    #[arg(required = true, trailing_var_arg = true)]
    pub(crate) command: Vec<String>,
}

/// Arguments for the `dropship list` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ListCommand {
    /// Host address; defaults to `host_address` from configuration.
    #[arg(long, value_name = "ADDRESS")]
    pub(crate) address: Option<String>,
    /// Kind of component to list.
    #[arg(value_enum)]
    pub(crate) kind: ComponentKind,
}

/// Component kinds that can be listed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum ComponentKind {
    /// PostgreSQL databases.
    Database,
    /// The Redis cache.
    Cache,
    /// Deployed web applications.
    App,
}
