//! Logscope CLI -- command-line log analysis
//!
//! Batch analysis of log files, live analysis of stdin, alert rule
//! validation and configuration inspection.

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use std::io::Write;

use clap::Parser;
use colored::Colorize;
use tracing::debug;

use logscope_core::config::{GeneralConfig, LogscopeConfig};

use crate::cli::{Cli, Commands};
use crate::commands::config::ConfigSource;
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let source = ConfigSource::resolve(cli.config.as_deref());
    let loaded = source.load().await;

    // an invalid file still gets a working logger so the error can be reported
    let general = loaded
        .as_ref()
        .map(|c| c.general.clone())
        .unwrap_or_else(|_| GeneralConfig::default());
    if let Err(e) = logging::init_tracing(&general, cli.log_level.as_deref()) {
        eprintln!("{} {e}", "warning:".yellow().bold());
    }
    debug!(config = %source.label(), "logscope starting");

    let writer = OutputWriter::new(cli.output);
    let code = match run(cli.command, &source, loaded, &writer).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            e.exit_code()
        }
    };

    let _ = std::io::stdout().flush();
    // exit directly: a blocked stdin read would otherwise hold runtime shutdown
    std::process::exit(code);
}

async fn run(
    command: Commands,
    source: &ConfigSource,
    loaded: Result<LogscopeConfig, CliError>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match command {
        Commands::Config(args) => commands::config::execute(args, source, loaded, writer).await,
        Commands::Rules(args) => commands::rules::execute(args, writer).await,
        Commands::Analyze(args) => commands::analyze::execute(args, loaded?, writer).await,
        Commands::Tail(args) => commands::tail::execute(args, loaded?, writer).await,
    }
}
