use std::process::ExitCode;

use clap::Parser;

mod backend;
mod cli;
mod commands;
mod config;

// Any failure exits with status -1.
const FAILURE: u8 = 255;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    init_tracing(cli.verbose);
    let printer = commands::Printer::new(cli.output);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            printer.error(&anyhow::Error::from(e).context("cannot start async runtime"));
            return ExitCode::from(FAILURE);
        }
    };

    match runtime.block_on(commands::run_command(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            printer.error(&e);
            ExitCode::from(FAILURE)
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}
