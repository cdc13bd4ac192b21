//! CLDC command-line runner
//!
//! Assembles `.jasm` class sources, loads them into a VM and runs a main
//! method until every context has finished or blocked.

mod commands;
mod config;

use clap::{Parser, Subcommand, ValueEnum};
use cldc_engine::SchedulingPolicy;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cldc")]
#[command(about = "CLDC bytecode engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Log filter, e.g. `debug` or `cldc_engine=trace` (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble, load and run a main class
    Run {
        /// `.jasm` source files
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Class whose `main` is run, e.g. `app/Main` or `app.Main`
        #[arg(short, long)]
        main: String,
        /// Scheduling policy
        #[arg(long, value_enum)]
        policy: Option<Policy>,
        /// Scheduler turn window in milliseconds
        #[arg(long)]
        window_ms: Option<u64>,
        /// Trace every instruction and frame transition
        #[arg(long)]
        trace: bool,
        /// Configuration file with a `[vm]` table
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Assemble sources and list their classes and methods
    Check {
        /// `.jasm` source files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

/// `--policy` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Policy {
    FairShare,
    RoundRobin,
}

impl From<Policy> for SchedulingPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::FairShare => SchedulingPolicy::FairShare,
            Policy::RoundRobin => SchedulingPolicy::RoundRobin,
        }
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let result = match cli.command {
        Commands::Run {
            files,
            main,
            policy,
            window_ms,
            trace,
            config,
        } => {
            let overrides = config::Overrides {
                policy: policy.map(Into::into),
                window_ms,
                trace,
            };
            commands::run::execute(&files, &main, config.as_deref(), overrides)
        }
        Commands::Check { files } => commands::check::execute(&files).map(|()| 0),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
