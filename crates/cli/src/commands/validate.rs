//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::AppConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;
use crate::error::CliError;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    servers: Vec<String>,
    burst_size: u32,
    timeout_ms: u64,
    resync_interval_s: u64,
    state_path: String,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            error: Some(CliError::config_not_found(config_path.clone()).to_string()),
            config_path,
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    servers: config.sync.servers.clone(),
                    burst_size: config.sync.burst_size,
                    timeout_ms: config.sync.timeout_ms,
                    resync_interval_s: config.sync.resync_interval_s,
                    state_path: config.compensation.state_path.display().to_string(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.sync.servers.len() == 1 {
        warnings.push("Only one server configured - no fallback if it is unreachable".to_string());
    }

    if config.sync.resync_interval_s < 60 {
        warnings.push(format!(
            "sync.resync_interval_s = {} - public servers may rate-limit clients polling this often",
            config.sync.resync_interval_s
        ));
    }

    if config.sync.timeout_ms > 5_000 {
        warnings.push(format!(
            "sync.timeout_ms = {} - a burst may block for over {} s",
            config.sync.timeout_ms,
            config.sync.timeout_ms * config.sync.burst_size as u64 / 1_000
        ));
    }

    if config.calibration.min_samples < 10 {
        warnings.push(format!(
            "calibration.min_samples = {} - results from so few flashes are unreliable",
            config.calibration.min_samples
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Servers: {}", summary.servers.join(", "));
            println!("  Burst size: {}", summary.burst_size);
            println!("  Timeout: {} ms", summary.timeout_ms);
            println!("  Resync interval: {} s", summary.resync_interval_s);
            println!("  State file: {}", summary.state_path);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
