//! `sync` command implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use contracts::SyncResult;
use observability::SyncStatsAggregator;
use serde::Serialize;
use tracing::{info, warn};

use super::{build_service, format_epoch_millis, load_config, sync_blocking};
use crate::cli::SyncArgs;
use crate::error::CliError;

/// Sync result for JSON output
#[derive(Serialize)]
struct SyncReport<'a> {
    server: &'a str,
    offset_ms: f64,
    rtt_ms: f64,
    samples_used: u32,
    wall_clock: String,
}

impl<'a> From<&'a SyncResult> for SyncReport<'a> {
    fn from(result: &'a SyncResult) -> Self {
        Self {
            server: &result.server,
            offset_ms: result.offset_ms(),
            rtt_ms: result.rtt_ms(),
            samples_used: result.samples_used,
            wall_clock: format_epoch_millis(result.wall_clock_epoch_millis),
        }
    }
}

/// Execute the `sync` command
pub async fn run_sync(args: &SyncArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let service = build_service(&config);
    let count = args.count.max(1);

    info!(servers = ?service.servers(), bursts = count, "Syncing");

    let mut stats = SyncStatsAggregator::new();
    let mut last_error = None;

    for burst in 0..count {
        if burst > 0 {
            tokio::time::sleep(Duration::from_millis(args.pause_ms)).await;
        }

        match sync_blocking(&service).await {
            Ok(result) => {
                observability::record_sync_result(&result);
                stats.update(&result);
                print_result(&result, args.json)?;
            }
            Err(e) => {
                warn!(burst, error = %e, "Burst failed");
                for server in service.servers() {
                    observability::record_sync_failure(server);
                }
                stats.record_failure();
                last_error = Some(e);
            }
        }
    }

    if count > 1 && !args.json {
        print!("\n{}", stats.summary());
    }

    match last_error {
        Some(e) if stats.total_syncs == 0 => Err(e),
        _ => Ok(()),
    }
}

fn print_result(result: &SyncResult, json: bool) -> Result<()> {
    if json {
        let json = serde_json::to_string(&SyncReport::from(result))
            .context("Failed to serialize sync result")?;
        println!("{}", json);
    } else {
        println!(
            "{}  offset {:+.3} ms  rtt {:.3} ms  ({} samples, {})",
            format_epoch_millis(result.wall_clock_epoch_millis),
            result.offset_ms(),
            result.rtt_ms(),
            result.samples_used,
            result.server
        );
    }
    Ok(())
}

/// Error for callers that need a synced clock
pub(crate) fn not_synced() -> anyhow::Error {
    CliError::sync_failed("clock is not synced").into()
}
