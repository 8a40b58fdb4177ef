//! Weave command-line driver
//!
//! Reads a unit as JSON trees, expands it with the test harness rules and
//! either prints the result or runs its tests.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    reason = "CLI tool needs to print to stdout/stderr"
)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

mod config;
mod expand;
mod rules;
mod source;
mod test;

#[derive(Parser)]
#[command(name = "weave")]
#[command(about = "Rule-driven tree expansion", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./weave.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the expansion depth limit
    #[arg(long, global = true)]
    max_depth: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand a unit and print the expanded tree
    Expand {
        /// JSON file holding one tree or an array of trees
        path: PathBuf,

        /// Print JSON instead of the s-expression form
        #[arg(long)]
        json: bool,
    },

    /// Expand a unit and run its tests
    Test {
        /// JSON file holding one tree or an array of trees
        path: PathBuf,
    },

    /// List the registered rules
    Rules,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = config::Settings::load(cli.config.as_deref())?;
    if let Some(max_depth) = cli.max_depth {
        settings.expand.max_depth = max_depth;
    }
    init_logging(&settings.log);

    match cli.command {
        Commands::Expand { path, json } => expand::expand(&path, &settings, json)?,
        Commands::Test { path } => test::test(&path, &settings)?,
        Commands::Rules => rules::list()?,
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured filter
fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}
