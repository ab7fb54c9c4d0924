//! `status`, `set-delay` and `reset` command implementations.

use anyhow::{Context, Result};
use contracts::{AppConfig, CompensationState, MAX_DELAY_NANOS, NANOS_PER_MILLI};
use serde::Serialize;
use tracing::{info, warn};

use super::{build_service, format_epoch_millis, load_config};
use crate::cli::{ResetArgs, SetDelayArgs, StatusArgs};

/// Compensation status for JSON output
#[derive(Serialize)]
struct StatusReport {
    delay_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    precision_ms: Option<f64>,
    calibrated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    calibrated_at: Option<String>,
    state_path: String,
}

impl StatusReport {
    fn new(state: &CompensationState, config: &AppConfig) -> Self {
        Self {
            delay_ms: state.delay_ms(),
            precision_ms: state.precision(),
            calibrated: state.is_calibrated(),
            calibrated_at: state
                .is_calibrated()
                .then(|| format_epoch_millis(state.calibrated_at_epoch_millis)),
            state_path: config.compensation.state_path.display().to_string(),
        }
    }
}

/// Execute the `status` command
pub fn run_status(args: &StatusArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let service = build_service(&config);
    let state = service.store().snapshot();
    let report = StatusReport::new(&state, &config);

    if args.json {
        let json =
            serde_json::to_string_pretty(&report).context("Failed to serialize status")?;
        println!("{}", json);
        return Ok(());
    }

    println!("Display delay: {:.3} ms", report.delay_ms);
    match report.precision_ms {
        Some(precision) => println!("Precision: ±{:.3} ms", precision),
        None => println!("Precision: unknown"),
    }
    match report.calibrated_at {
        Some(ref at) => println!("Calibrated at: {}", at),
        None => println!(
            "Not calibrated; using heuristic for {} Hz",
            config.compensation.fallback_refresh_hz
        ),
    }
    println!("State file: {}", report.state_path);

    Ok(())
}

/// Execute the `set-delay` command
pub fn run_set_delay(args: &SetDelayArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let service = build_service(&config);

    let state = service
        .submit_manual_delay(args.delay_ms)
        .context("Failed to store manual delay")?;
    observability::record_compensation_delay(&state);

    if was_clamped(args.delay_ms, &state) {
        warn!(
            requested_ms = args.delay_ms,
            stored_ms = state.delay_ms(),
            max_ms = MAX_DELAY_NANOS / NANOS_PER_MILLI,
            "Delay clamped into accepted range"
        );
    }
    info!(delay_ms = state.delay_ms(), "Manual delay stored");
    println!("Display delay set to {:.3} ms", state.delay_ms());

    Ok(())
}

/// Execute the `reset` command
pub fn run_reset(args: &ResetArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let service = build_service(&config);

    let state = service
        .reset_compensation()
        .context("Failed to reset compensation")?;
    observability::record_compensation_delay(&state);

    println!(
        "Compensation reset; heuristic delay {:.3} ms for {} Hz",
        state.delay_ms(),
        config.compensation.fallback_refresh_hz
    );
    Ok(())
}

fn was_clamped(requested_ms: f64, state: &CompensationState) -> bool {
    !requested_ms.is_finite()
        || (requested_ms * NANOS_PER_MILLI as f64).round() != state.delay_nanos as f64
}
