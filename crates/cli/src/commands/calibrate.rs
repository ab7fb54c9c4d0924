//! `calibrate` command implementation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use calibration::{
    CalibrationSession, FlashScheduler, SimulatedCamera, SimulatedCameraConfig, SimulatedDisplay,
};
use contracts::{CalibrationParams, CalibrationResult, CalibrationState, CameraTier, CompensationState};
use serde::Serialize;
use sync_engine::{MonotonicSource, SystemMonotonic};
use tracing::{info, warn};

use super::{build_service, load_config, shutdown_signal};
use crate::cli::CalibrateArgs;
use crate::error::CliError;

/// How often run progress is reported
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Calibration outcome for JSON output
#[derive(Serialize)]
struct CalibrationReport {
    tier: CameraTier,
    result: CalibrationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    stored: Option<CompensationState>,
    flashes_emitted: u64,
    flashes_dropped: u64,
}

/// Execute the `calibrate` command
pub async fn run_calibrate(args: &CalibrateArgs) -> Result<()> {
    if !args.simulate {
        return Err(CliError::NoCameraBackend.into());
    }

    let mut config = load_config(&args.config)?;
    if args.duration.is_some() {
        config.calibration.run_duration_override_s = args.duration;
        config_loader::ConfigLoader::validate(&config).context("Invalid --duration")?;
    }

    let camera_config = SimulatedCameraConfig {
        fps: args.fps,
        display_latency: millis_to_duration(args.latency_ms).context("Invalid --latency-ms")?,
        jitter: millis_to_duration(args.jitter_ms).context("Invalid --jitter-ms")?,
        ..Default::default()
    };

    let monotonic: Arc<dyn MonotonicSource> = Arc::new(SystemMonotonic::new());
    let display = Arc::new(SimulatedDisplay::new(
        config.compensation.fallback_refresh_hz,
    ));
    let camera = Arc::new(SimulatedCamera::new(
        camera_config,
        Arc::clone(&display),
        Arc::clone(&monotonic),
    ));

    let tier = CameraTier::from_fps(args.fps);
    let params = CalibrationParams::for_fps(args.fps);
    info!(
        ?tier,
        fps = args.fps,
        latency_ms = args.latency_ms,
        "Starting simulated calibration"
    );

    let session = Arc::new(CalibrationSession::new(config.calibration.clone()));
    session
        .start_calibration(params, camera)
        .map_err(|e| CliError::calibration(e.to_string()))?;

    let flash_session = Arc::clone(&session);
    let scheduler = FlashScheduler::start(
        &params,
        monotonic,
        display,
        Arc::new(move |ts| flash_session.on_flash_emitted(ts)),
    );

    let final_state = wait_for_run(&session).await?;
    scheduler.stop();

    match final_state {
        CalibrationState::Completed { result } => {
            observability::record_calibration_result(&result);

            let stored = if args.dry_run {
                None
            } else {
                let service = build_service(&config);
                let state = service
                    .submit_calibration_result(&result)
                    .context("Failed to store calibration result")?;
                observability::record_compensation_delay(&state);
                Some(state)
            };

            let report = CalibrationReport {
                tier,
                result,
                stored,
                flashes_emitted: scheduler.emitted(),
                flashes_dropped: session.dropped_flashes(),
            };
            print_report(&report, args.json)
        }
        CalibrationState::Error { message } => Err(CliError::calibration(message).into()),
        CalibrationState::Idle => {
            warn!("Calibration cancelled");
            Ok(())
        }
        other => {
            warn!(state = ?other, "Calibration worker did not stop in time");
            Ok(())
        }
    }
}

/// Report progress until the run leaves the active states or a signal arrives
async fn wait_for_run(session: &Arc<CalibrationSession>) -> Result<CalibrationState> {
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let state = session.state();
                match state {
                    CalibrationState::Recording { progress, sample_count } => {
                        info!(
                            progress = format!("{:.0}%", progress * 100.0),
                            samples = sample_count,
                            "Recording"
                        );
                    }
                    CalibrationState::Analyzing { .. } | CalibrationState::Initializing => {}
                    finished => return Ok(finished),
                }
            }
            _ = &mut shutdown => {
                warn!("Received shutdown signal, stopping calibration...");
                let worker = Arc::clone(session);
                return tokio::task::spawn_blocking(move || worker.stop_calibration())
                    .await
                    .context("Calibration stop panicked");
            }
        }
    }
}

fn print_report(report: &CalibrationReport, json: bool) -> Result<()> {
    if json {
        let json = serde_json::to_string_pretty(report)
            .context("Failed to serialize calibration result")?;
        println!("{}", json);
        return Ok(());
    }

    let result = &report.result;
    println!("Calibration complete ({:?} tier)", report.tier);
    println!("  Median delay: {:.3} ms", result.median_delay_ms);
    println!("  Mean delay:   {:.3} ms", result.mean_delay_ms);
    println!("  Std dev:      {:.3} ms", result.std_dev_ms);
    println!("  Precision:    ±{:.3} ms", result.estimated_precision_ms);
    println!(
        "  Samples:      {} kept, {} outliers ({} flashes, {} dropped)",
        result.sample_count, result.outlier_count, report.flashes_emitted, report.flashes_dropped
    );
    match report.stored {
        Some(state) => println!("Stored display delay: {:.3} ms", state.delay_ms()),
        None => println!("Dry run; compensation left unchanged"),
    }
    Ok(())
}

fn millis_to_duration(ms: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(ms / 1_000.0).map_err(|e| anyhow::anyhow!("{ms} ms: {e}"))
}
