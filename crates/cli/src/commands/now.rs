//! `now` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;

use super::sync::not_synced;
use super::{build_service, format_precise, load_config, sync_blocking};
use crate::cli::NowArgs;

/// Time report for JSON output
#[derive(Serialize)]
struct NowReport {
    time: String,
    epoch_millis: i64,
    sub_milli_micros: u16,
    sub_micro_nanos: u16,
    compensated: bool,
    delay_ms: f64,
    offset_ms: f64,
}

/// Execute the `now` command
pub async fn run_now(args: &NowArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let service = build_service(&config);

    let result = sync_blocking(&service).await?;

    let now = if args.raw {
        service.now()
    } else {
        service.compensated_now()
    }
    .ok_or_else(not_synced)?;

    let delay_ms = if args.raw {
        0.0
    } else {
        service.current_delay_ms()
    };

    if args.json {
        let report = NowReport {
            time: format_precise(&now),
            epoch_millis: now.epoch_millis,
            sub_milli_micros: now.sub_milli_micros,
            sub_micro_nanos: now.sub_micro_nanos,
            compensated: !args.raw,
            delay_ms,
            offset_ms: result.offset_ms(),
        };
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize time")?;
        println!("{}", json);
    } else {
        println!("{}", format_precise(&now));
        if !args.raw {
            let source = if service.is_calibrated() {
                "calibrated"
            } else {
                "heuristic"
            };
            println!("  display delay {:.3} ms ({})", delay_ms, source);
        }
        println!(
            "  offset {:+.3} ms via {} (rtt {:.3} ms)",
            result.offset_ms(),
            result.server,
            result.rtt_ms()
        );
    }

    Ok(())
}
