//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// truetime - network-synchronised, display-compensated time
#[derive(Parser, Debug)]
#[command(
    name = "truetime",
    author,
    version,
    about = "Network-synchronised, display-compensated time",
    long_about = "Estimates true wall-clock time from SNTP bursts and compensates for\n\
                  display pipeline latency measured by flash correlation."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TRUETIME_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "compact",
        global = true,
        env = "TRUETIME_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    /// Expose Prometheus metrics on this port
    #[arg(long, global = true, env = "TRUETIME_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run SNTP bursts and report the committed offset
    Sync(SyncArgs),

    /// Print true time (compensated by default)
    Now(NowArgs),

    /// Keep syncing in the background and print time continuously
    Watch(WatchArgs),

    /// Measure display latency and store it
    Calibrate(CalibrateArgs),

    /// Show the stored compensation
    Status(StatusArgs),

    /// Override the display delay by hand
    SetDelay(SetDelayArgs),

    /// Forget the stored delay and fall back to the heuristic
    Reset(ResetArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display the effective configuration
    Info(InfoArgs),
}

/// Configuration source, shared by every command
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to configuration file (TOML or JSON); defaults apply if absent
    #[arg(
        short,
        long,
        default_value = "truetime.toml",
        env = "TRUETIME_CONFIG"
    )]
    pub config: PathBuf,

    /// Override the configured server list
    #[arg(long = "server", env = "TRUETIME_SERVERS", value_delimiter = ',')]
    pub servers: Vec<String>,

    /// Override the compensation state file
    #[arg(long, env = "TRUETIME_STATE_PATH")]
    pub state_path: Option<PathBuf>,
}

/// Arguments for the `sync` command
#[derive(Parser, Debug, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Number of bursts to run
    #[arg(short = 'n', long, default_value = "1")]
    pub count: u32,

    /// Pause between bursts in milliseconds
    #[arg(long, default_value = "1000")]
    pub pause_ms: u64,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `now` command
#[derive(Parser, Debug, Clone)]
pub struct NowArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Print uncompensated true time
    #[arg(long)]
    pub raw: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `watch` command
#[derive(Parser, Debug, Clone)]
pub struct WatchArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Resync interval in seconds (defaults to the configured interval)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,

    /// Print period in milliseconds
    #[arg(long, default_value = "1000")]
    pub tick_ms: u64,

    /// Stop after this many seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0", env = "TRUETIME_WATCH_TIMEOUT")]
    pub timeout: u64,
}

/// Arguments for the `calibrate` command
#[derive(Parser, Debug, Clone)]
pub struct CalibrateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Use the synthetic flash / display / camera rig
    #[arg(long)]
    pub simulate: bool,

    /// Simulated camera frame rate
    #[arg(long, default_value = "240")]
    pub fps: f64,

    /// Simulated display latency in milliseconds
    #[arg(long, default_value = "30")]
    pub latency_ms: f64,

    /// Simulated latency jitter (±) in milliseconds
    #[arg(long, default_value = "0.5")]
    pub jitter_ms: f64,

    /// Override the run duration in seconds
    #[arg(long)]
    pub duration: Option<f64>,

    /// Measure but do not store the result
    #[arg(long)]
    pub dry_run: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `status` command
#[derive(Parser, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `set-delay` command
#[derive(Parser, Debug, Clone)]
pub struct SetDelayArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Delay in milliseconds (clamped to 0-100)
    #[arg(allow_negative_numbers = true)]
    pub delay_ms: f64,
}

/// Arguments for the `reset` command
#[derive(Parser, Debug, Clone)]
pub struct ResetArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "truetime.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show calibration parameters per camera tier
    #[arg(long)]
    pub tiers: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
