mod commands;
mod config;

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{Cli, Command};

fn main() -> anyhow::Result<ExitCode> {
    // Logs go to stderr; stdout carries the JSON output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    info!("Starting docx-revise v{}", env!("CARGO_PKG_VERSION"));

    let mut stdout = io::stdout().lock();
    match cli.command {
        Command::Paragraphs(args) => {
            commands::paragraphs(&args, &mut stdout)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Apply(args) => {
            let report = commands::apply(&args, &mut stdout)?;
            if report.is_complete() || args.allow_partial {
                Ok(ExitCode::SUCCESS)
            } else {
                warn!(
                    "{} of {} edit(s) could not be applied",
                    report.failed,
                    report.applied + report.failed
                );
                Ok(ExitCode::from(2))
            }
        }
    }
}
