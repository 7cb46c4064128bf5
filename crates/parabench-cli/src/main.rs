//! Parabench CLI - Distributed Training Benchmark Launcher
//!
//! # Commands
//! - `parabench train` - Run the benchmark over a simulated multi-rank world
//! - `parabench volume` - Show the modelled byte volume of a collective
//! - `parabench init` - Write a default configuration file
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::doc_markdown)]

use std::fs::File;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

mod cli;
mod commands;
mod config;
mod error;

use cli::{Cli, Commands};
use error::CliResult;

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    match cli.command {
        Commands::Train(args) => commands::train::execute(args, cli.quiet),
        Commands::Volume(args) => commands::volume::execute(args),
        Commands::Init(args) => commands::init::execute(args),
    }
}

/// Installs the global subscriber: stderr always, plus a plain-text file
/// layer when `--log-file` is given. `RUST_LOG` overrides the level flags.
fn init_logging(cli: &Cli) -> CliResult<()> {
    let default_level = if cli.verbose {
        "parabench=debug,parabench_distributed=debug,parabench_profile=debug,parabench_metrics=debug,warn"
    } else if cli.quiet {
        "warn"
    } else {
        "parabench=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());

    let file_layer = match &cli.log_file {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(File::create(path)?)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}
