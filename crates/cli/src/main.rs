//! Fleetrun CLI entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: load the YAML runbook named by `--runbook`
//!    (or `FLEETRUN_RUNBOOK`); without one the environment is a single local
//!    node.
//! 2. **Wire observability**: install `tracing-subscriber` with an `EnvFilter`
//!    (`RUST_LOG`, falling back to `--log-level`) and a text or JSON
//!    formatter. Logs go to stderr so command output owns stdout.
//! 3. **Construct infrastructure**: [`shell::ShellTransportFactory`] and
//!    [`tools::default_registry`] are injected into [`fleet::FleetServices`],
//!    and the runbook entries are provisioned into a [`fleet::Nodes`].
//! 4. **Run the subcommand**: `info` or `exec`. The collection is closed
//!    afterwards whatever the outcome.

mod commands;
mod runbook;

use std::convert::Infallible;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fleet::NodeKey;

use crate::commands::Target;
use crate::runbook::Runbook;

/// Run commands across a fleet of local and remote nodes.
#[derive(Parser)]
#[command(name = "fleetrun")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Runbook describing the environment
    #[arg(short, long, global = true, env = "FLEETRUN_RUNBOOK", value_name = "FILE")]
    runbook: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "FLEETRUN_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize every node and show what it runs
    Info {
        /// Print a JSON array instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Run a command through the shell of one or all nodes
    Exec {
        /// Node position or name (defaults to the environment's default node)
        #[arg(short, long, conflicts_with = "all", value_parser = parse_node_key)]
        node: Option<NodeKey>,

        /// Run on every node in parallel
        #[arg(short, long)]
        all: bool,

        /// Command line to run
        #[arg(trailing_var_arg = true, required = true, num_args = 1..)]
        command: Vec<String>,
    },
}

// clap would otherwise go through `From<String>` and never yield a position.
fn parse_node_key(raw: &str) -> Result<NodeKey, Infallible> {
    raw.parse()
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format)?;

    let runbook = match &cli.runbook {
        Some(path) => Runbook::load(path)?,
        None => Runbook::default(),
    };
    let nodes = Arc::new(
        runbook
            .build(runbook.services())
            .context("cannot provision environment")?,
    );

    let outcome = match cli.command {
        Commands::Info { json } => commands::info(nodes.clone(), json).await,
        Commands::Exec { node, all, command } => {
            let target = match (node, all) {
                (_, true) => Target::All,
                (Some(key), false) => Target::Node(key),
                (None, false) => Target::Default,
            };
            commands::exec(nodes.clone(), target, command.join(" ")).await
        }
    };

    if let Err(e) = nodes.close().await {
        tracing::warn!(error = %e, "environment did not close cleanly");
    }

    Ok(if outcome? { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match format {
        LogFormat::Text => builder.compact().init(),
        LogFormat::Json => builder.json().with_current_span(true).init(),
    }
    Ok(())
}
