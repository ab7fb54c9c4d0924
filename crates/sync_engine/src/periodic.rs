//! Periodic background resync.
//!
//! Quartz drift makes a committed offset decay; this task re-runs the burst on
//! a fixed interval on the tokio blocking pool, skipping ticks while another
//! sync is in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::engine::SyncEngine;
use crate::error::SyncError;

/// Shortest tick the task accepts; tokio rejects a zero period
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to a running periodic resync task
#[derive(Debug)]
pub struct PeriodicSync {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicSync {
    /// Spawn the task on the current tokio runtime
    ///
    /// The first tick fires immediately. Intervals below 1 ms are raised to 1 ms.
    #[instrument(name = "periodic_sync_spawn", skip(engine, servers))]
    pub fn spawn(engine: Arc<SyncEngine>, servers: Vec<String>, interval: Duration) -> Self {
        let interval = interval.max(MIN_INTERVAL);
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_once(&engine, &servers).await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("periodic sync stopped");
        });

        info!(interval_s = interval.as_secs_f64(), "periodic sync started");
        Self { shutdown, handle }
    }

    /// Signal the task to stop and wait for it
    ///
    /// A burst already running finishes first (bounded by the transport timeout).
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "periodic sync task ended abnormally");
        }
    }

    /// Whether the task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

async fn run_once(engine: &Arc<SyncEngine>, servers: &[String]) {
    if engine.is_in_flight() {
        debug!("sync already in flight, skipping tick");
        return;
    }

    let engine = Arc::clone(engine);
    let servers = servers.to_vec();
    match tokio::task::spawn_blocking(move || engine.try_sync_any(&servers)).await {
        Ok(Ok(result)) => {
            debug!(server = %result.server, offset_ms = result.offset_ms(), "periodic sync ok");
        }
        Ok(Err(SyncError::InFlight)) => {
            debug!("sync already in flight, skipping tick");
        }
        Ok(Err(e)) => {
            warn!(error = %e, "periodic sync failed");
        }
        Err(e) => {
            error!(error = %e, "periodic sync worker panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{ScriptedFactory, Step};
    use crate::engine::SyncEngineConfig;
    use crate::monotonic::ManualClock;

    #[tokio::test]
    async fn test_periodic_sync_commits_and_stops() {
        let clock = Arc::new(ManualClock::new(1_000_000_000));
        let factory = ScriptedFactory::new(
            Arc::clone(&clock),
            vec![Step::Reply {
                rtt_ms: 2,
                offset_nanos: 1_700_000_000_000_000_000,
            }],
        );
        let config = SyncEngineConfig {
            burst_size: 1,
            sample_pause: Duration::ZERO,
            ..Default::default()
        };
        let engine = Arc::new(SyncEngine::new(config, Arc::new(factory), clock));

        let task = PeriodicSync::spawn(
            Arc::clone(&engine),
            vec!["scripted".to_string()],
            Duration::from_millis(20),
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(engine.register().is_synced());
        // Later ticks time out; the first offset must survive them
        let offset = engine.register().load();
        assert_eq!(engine.history().len(), 1);

        task.shutdown().await;
        assert_eq!(engine.register().load(), offset);
    }

    #[tokio::test]
    async fn test_zero_interval_does_not_kill_task() {
        let clock = Arc::new(ManualClock::new(1_000_000_000));
        let factory = ScriptedFactory::new(
            Arc::clone(&clock),
            vec![Step::Reply {
                rtt_ms: 2,
                offset_nanos: 1_700_000_000_000_000_000,
            }],
        );
        let config = SyncEngineConfig {
            burst_size: 1,
            sample_pause: Duration::ZERO,
            ..Default::default()
        };
        let engine = Arc::new(SyncEngine::new(config, Arc::new(factory), clock));

        let task = PeriodicSync::spawn(
            Arc::clone(&engine),
            vec!["scripted".to_string()],
            Duration::ZERO,
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!task.is_finished());
        assert!(engine.register().is_synced());
        task.shutdown().await;
    }
}
