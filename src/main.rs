//! Binary entry point for the dropship CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use shell_escape::unix::escape;
use thiserror::Error;

use dropship::{
    CommandError, Component, Database, Engine, Params, ProvisionConfig, ProvisionError,
    RedisCache, SshTransport, StoreError, TaskGraph, Transport, TransportConfig, TransportError,
    WebApp, escape_braces, logging, provision,
};

mod cli;

use cli::{Cli, Commands, ComponentKind, ListCommand, RunCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("no host address: pass --address or set DROPSHIP_HOST_ADDRESS")]
    MissingAddress,
    #[error("invalid command argument: {0}")]
    InvalidCommand(String),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let exit_code = match dispatch(cli.command).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Provision => provision_command().await,
        Commands::Run(args) => run_command(&args),
        Commands::List(args) => list_command(&args),
    }
}

async fn provision_command() -> Result<(), CliError> {
    let (config, transport_config) = load_configs()?;
    let report = provision::provision(&config, transport_config).await?;

    let mut stdout = io::stdout();
    writeln!(stdout, "host:     {}", report.address).ok();
    writeln!(stdout, "database: {}", report.database_url).ok();
    writeln!(stdout, "cache:    {}", report.cache_url).ok();
    writeln!(stdout, "app:      {}", report.app_url).ok();
    Ok(())
}

fn run_command(args: &RunCommand) -> Result<(), CliError> {
    validate_command_args(&args.command)?;
    let (config, transport_config) = load_configs()?;
    let address = host_address(args.address.as_deref(), &config)?;

    let transport = SshTransport::connect_with_process_runner(transport_config, address)?;
    let result = run_tracked(&transport, &config.state_dir, &args.command, args.force);
    transport.close();
    let (stdout, stderr) = result?;

    io::stdout().write_all(stdout.as_bytes()).ok();
    io::stderr().write_all(stderr.as_bytes()).ok();
    Ok(())
}

fn run_tracked<T: Transport + ?Sized>(
    transport: &T,
    state_dir: &str,
    command: &[String],
    force: bool,
) -> Result<(String, String), CliError> {
    let engine = Engine::new(transport, state_dir);
    let mut graph = TaskGraph::new();
    let id = graph.add_command(escape_braces(&render_remote_command(command)), None)?;
    engine.exec(&mut graph, id, force, &Params::new())?;
    let finished = graph.command(id)?;
    Ok((finished.stdout().to_owned(), finished.stderr().to_owned()))
}

fn list_command(args: &ListCommand) -> Result<(), CliError> {
    let (config, transport_config) = load_configs()?;
    let address = host_address(args.address.as_deref(), &config)?;

    let transport = SshTransport::connect_with_process_runner(transport_config, address)?;
    let names = Engine::new(&transport, config.state_dir.clone())
        .store()
        .list(type_name(args.kind));
    transport.close();

    let mut stdout = io::stdout();
    for name in names? {
        writeln!(stdout, "{name}").ok();
    }
    Ok(())
}

fn load_configs() -> Result<(ProvisionConfig, TransportConfig), CliError> {
    let config =
        ProvisionConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let transport_config =
        TransportConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    Ok((config, transport_config))
}

fn host_address(flag: Option<&str>, config: &ProvisionConfig) -> Result<String, CliError> {
    flag.map(str::trim)
        .filter(|address| !address.is_empty())
        .or_else(|| provision::configured_address(config))
        .map(str::to_owned)
        .ok_or(CliError::MissingAddress)
}

const fn type_name(kind: ComponentKind) -> &'static str {
    match kind {
        ComponentKind::Database => Database::TYPE_NAME,
        ComponentKind::Cache => RedisCache::TYPE_NAME,
        ComponentKind::App => WebApp::TYPE_NAME,
    }
}

fn render_remote_command(args: &[String]) -> String {
    let mut result = String::new();
    let mut first = true;

    for arg in args {
        if first {
            first = false;
        } else {
            result.push(' ');
        }

        let escaped = escape(arg.as_str().into());
        result.push_str(escaped.as_ref());
    }

    result
}

fn validate_command_args(args: &[String]) -> Result<(), CliError> {
    for arg in args {
        if arg
            .chars()
            .any(|ch| matches!(ch, '\n' | '\r' | '\u{0000}'..='\u{001F}' | '\u{007F}'))
        {
            return Err(CliError::InvalidCommand(String::from(concat!(
                "command arguments must not contain control characters (ASCII ",
                "0x00-0x1F or 0x7F, e.g. newline, carriage return, tab, NUL)"
            ))));
        }
    }
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
