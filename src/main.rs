mod cli;
mod commands;
mod error;

use crate::cli::{Cli, Command};
use crate::commands::Context;
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use shoebox_config::Config;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = ?err, "shoebox failed");
            eprintln!("error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

/// Logs go to stderr so stdout stays clean for JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let context = Context::new(config);
    match &cli.command {
        Command::Probe => commands::probe(&context).await,
        Command::Scan(args) => commands::scan_totals(&context, args).await,
        Command::Check(args) => commands::check(&context, args).await,
        Command::Upload(args) => commands::upload(&context, args).await,
    }
}
