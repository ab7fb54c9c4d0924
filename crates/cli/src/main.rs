//! # truetime CLI
//!
//! Command-line entry point.
//!
//! Provides:
//! - Configuration loading and validation
//! - One-shot and continuous time sync
//! - Display latency calibration and compensation management

mod cli;
mod commands;
mod error;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::debug;

use cli::{Cli, Commands};
use commands::{
    run_calibrate, run_info, run_now, run_reset, run_set_delay, run_status, run_sync,
    run_validate, run_watch,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_observability(&cli)?;

    debug!(version = env!("CARGO_PKG_VERSION"), "truetime starting");

    let result = match &cli.command {
        Commands::Sync(args) => run_sync(args).await,
        Commands::Now(args) => run_now(args).await,
        Commands::Watch(args) => run_watch(args).await,
        Commands::Calibrate(args) => run_calibrate(args).await,
        Commands::Status(args) => run_status(args),
        Commands::SetDelay(args) => run_set_delay(args),
        Commands::Reset(args) => run_reset(args),
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging and metrics based on CLI options
fn init_observability(cli: &Cli) -> Result<()> {
    let default_log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    observability::init_with_config(ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: cli.metrics_port,
        default_log_level: default_log_level.to_string(),
    })
}
