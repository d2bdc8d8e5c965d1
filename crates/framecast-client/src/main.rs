//! framecast CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use framecast_client::cli::{Cli, Command};
use framecast_client::commands;
use framecast_client::error::ClientResult;
use framecast_core::{TracingConfig, init_tracing};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing = TracingConfig::cli(cli.verbose).with_format(cli.log_format.into());
    if let Err(e) = init_tracing(tracing) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> ClientResult<()> {
    match cli.command {
        Command::Serve(args) => commands::serve::run(&args),
        Command::Send(args) => commands::send::run(&args),
    }
}
