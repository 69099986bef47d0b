use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod config;
mod discovery;
mod dock;
mod invoke;
mod manifest;
mod paths;
mod pipeline;
mod prepare;
mod run;
mod status;
mod stop;
mod text;
mod util;
mod validate;
mod views;
mod workflow;

use cli::{Command, RootArgs};

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(verbose_requested(&args.command));

    match args.command {
        Command::Prepare(args) => workflow::run_prepare(args),
        Command::Dock(args) => workflow::run_dock(args),
        Command::Pipeline(args) => workflow::run_pipeline_command(args),
        Command::Status(args) => workflow::run_status(args),
    }
}

fn verbose_requested(command: &Command) -> bool {
    match command {
        Command::Prepare(args) => args.common.verbose,
        Command::Dock(args) => args.common.verbose,
        Command::Pipeline(args) => args.common.verbose,
        Command::Status(_) => false,
    }
}

/// Diagnostics go to stderr; `RUST_LOG` overrides the default level.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
