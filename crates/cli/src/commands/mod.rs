//! Command implementations.

mod calibrate;
mod delay;
mod info;
mod now;
mod sync;
mod validate;
mod watch;

pub use calibrate::run_calibrate;
pub use delay::{run_reset, run_set_delay, run_status};
pub use info::run_info;
pub use now::run_now;
pub use sync::run_sync;
pub use validate::run_validate;
pub use watch::run_watch;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use compensation::TimeService;
use contracts::{AppConfig, FixedDisplay, PreciseTime, SyncResult};
use tracing::{debug, info};

use crate::cli::ConfigArgs;
use crate::error::CliError;

/// Load the configuration and apply CLI overrides
pub(crate) fn load_config(args: &ConfigArgs) -> Result<AppConfig> {
    let mut config = config_loader::ConfigLoader::load_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if !args.servers.is_empty() {
        info!(servers = ?args.servers, "Overriding servers from CLI");
        config.sync.servers = args.servers.clone();
    }
    if let Some(ref path) = args.state_path {
        info!(path = %path.display(), "Overriding state path from CLI");
        config.compensation.state_path = path.clone();
    }

    config_loader::ConfigLoader::validate(&config).context("Invalid configuration overrides")?;
    debug!(?config, "configuration loaded");
    Ok(config)
}

/// Build the time service for `config`
///
/// The host display is not queried from a terminal; the configured refresh
/// rate stands in for it.
pub(crate) fn build_service(config: &AppConfig) -> Arc<TimeService> {
    Arc::new(TimeService::from_config(
        config,
        Arc::new(FixedDisplay::new(config.compensation.fallback_refresh_hz)),
    ))
}

/// Run a blocking sync off the async runtime
pub(crate) async fn sync_blocking(service: &Arc<TimeService>) -> Result<SyncResult> {
    let worker = Arc::clone(service);
    tokio::task::spawn_blocking(move || worker.try_sync())
        .await
        .context("Sync worker panicked")?
        .map_err(|e| CliError::sync_failed(e.to_string()).into())
}

/// RFC 3339 rendering of a millisecond timestamp
pub(crate) fn format_epoch_millis(epoch_millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| format!("{epoch_millis} ms"))
}

/// Full-resolution rendering of a `PreciseTime`
pub(crate) fn format_precise(time: &PreciseTime) -> String {
    DateTime::<Utc>::from_timestamp_nanos(time.as_unix_nanos())
        .to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Resolve on Ctrl+C or SIGTERM
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
