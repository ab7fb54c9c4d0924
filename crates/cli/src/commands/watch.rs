//! `watch` command implementation.

use std::time::Duration;

use anyhow::Result;
use observability::SyncStatsAggregator;
use tracing::{info, warn};

use super::{build_service, format_precise, load_config, shutdown_signal};
use crate::cli::WatchArgs;

/// Execute the `watch` command
pub async fn run_watch(args: &WatchArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let service = build_service(&config);

    let interval = args
        .interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.sync.resync_interval());

    if !service.start_periodic_sync(interval) {
        anyhow::bail!("Periodic sync could not be started");
    }
    info!(interval_s = interval.as_secs(), "Watching; press Ctrl+C to stop");

    let deadline = async {
        if args.timeout == 0 {
            std::future::pending::<()>().await;
        } else {
            tokio::time::sleep(Duration::from_secs(args.timeout)).await;
        }
    };
    tokio::pin!(deadline);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(Duration::from_millis(args.tick_ms.max(10)));
    let mut stats = SyncStatsAggregator::new();
    let mut last_seen: Option<i64> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(result) = service.engine().last_result() {
                    if last_seen != Some(result.wall_clock_epoch_millis) {
                        last_seen = Some(result.wall_clock_epoch_millis);
                        observability::record_sync_result(&result);
                        stats.update(&result);
                        info!(
                            server = %result.server,
                            offset_ms = format!("{:.3}", result.offset_ms()),
                            rtt_ms = format!("{:.3}", result.rtt_ms()),
                            "Resynced"
                        );
                    }
                }

                match service.compensated_now() {
                    Some(now) => println!("{}", format_precise(&now)),
                    None => println!("waiting for first sync..."),
                }
            }
            _ = &mut deadline => {
                info!("Watch timeout reached");
                break;
            }
            _ = &mut shutdown => {
                warn!("Received shutdown signal, stopping...");
                break;
            }
        }
    }

    service.stop_periodic_sync().await;
    print!("\n{}", stats.summary());
    Ok(())
}
