//! Configuration validation
//!
//! Rules:
//! - at least one sync server, none empty
//! - timeout > 0, burst size within 1..=16, resync interval >= 1s
//! - calibration minimum samples and queue capacity >= 1
//! - fallback refresh rate > 0

use contracts::{AppConfig, ContractError};

/// Largest burst a single sync call may issue
pub const MAX_BURST_SIZE: u32 = 16;

/// Validate an `AppConfig`
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &AppConfig) -> Result<(), ContractError> {
    validate_servers(config)?;
    validate_sync_timing(config)?;
    validate_calibration(config)?;
    validate_compensation(config)?;
    Ok(())
}

/// Validate the server list
fn validate_servers(config: &AppConfig) -> Result<(), ContractError> {
    if config.sync.servers.is_empty() {
        return Err(ContractError::config_validation(
            "sync.servers",
            "at least one server is required",
        ));
    }
    for (idx, server) in config.sync.servers.iter().enumerate() {
        if server.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("sync.servers[{}]", idx),
                "server name cannot be empty",
            ));
        }
    }
    Ok(())
}

/// Validate timeouts and burst shape
fn validate_sync_timing(config: &AppConfig) -> Result<(), ContractError> {
    let sync = &config.sync;

    if sync.timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "sync.timeout_ms",
            "timeout_ms must be > 0",
        ));
    }

    if sync.burst_size == 0 || sync.burst_size > MAX_BURST_SIZE {
        return Err(ContractError::config_validation(
            "sync.burst_size",
            format!(
                "burst_size must be within 1..={}, got {}",
                MAX_BURST_SIZE, sync.burst_size
            ),
        ));
    }

    if sync.resync_interval_s == 0 {
        return Err(ContractError::config_validation(
            "sync.resync_interval_s",
            "resync_interval_s must be >= 1",
        ));
    }

    Ok(())
}

/// Validate calibration settings
fn validate_calibration(config: &AppConfig) -> Result<(), ContractError> {
    let calibration = &config.calibration;

    if calibration.min_samples == 0 {
        return Err(ContractError::config_validation(
            "calibration.min_samples",
            "min_samples must be >= 1",
        ));
    }

    if calibration.flash_queue_capacity == 0 {
        return Err(ContractError::config_validation(
            "calibration.flash_queue_capacity",
            "flash_queue_capacity must be >= 1",
        ));
    }

    if let Some(duration) = calibration.run_duration_override_s {
        if !(duration.is_finite() && duration > 0.0) {
            return Err(ContractError::config_validation(
                "calibration.run_duration_override_s",
                format!("run duration must be > 0, got {}", duration),
            ));
        }
    }

    Ok(())
}

/// Validate compensation settings
fn validate_compensation(config: &AppConfig) -> Result<(), ContractError> {
    let hz = config.compensation.fallback_refresh_hz;
    if !(hz.is_finite() && hz > 0.0) {
        return Err(ContractError::config_validation(
            "compensation.fallback_refresh_hz",
            format!("fallback_refresh_hz must be > 0, got {}", hz),
        ));
    }
    Ok(())
}
