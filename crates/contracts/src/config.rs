//! Application configuration contracts that can be shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Network time synchronisation
    #[serde(default)]
    pub sync: SyncSettings,

    /// Display latency calibration
    #[serde(default)]
    pub calibration: CalibrationSettings,

    /// Compensation storage and fallback
    #[serde(default)]
    pub compensation: CompensationSettings,
}

/// SNTP engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Servers tried in order until one burst succeeds
    pub servers: Vec<String>,
    /// UDP port of the servers
    pub port: u16,
    /// Receive timeout per attempt (ms)
    pub timeout_ms: u64,
    /// Attempts per burst
    pub burst_size: u32,
    /// Pause between attempts (ms)
    pub sample_pause_ms: u64,
    /// Background resync interval (s)
    pub resync_interval_s: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            servers: vec!["time.google.com".to_string(), "pool.ntp.org".to_string()],
            port: 123,
            timeout_ms: 3_000,
            burst_size: 5,
            sample_pause_ms: 50,
            resync_interval_s: 600,
        }
    }
}

impl SyncSettings {
    /// Receive timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Inter-attempt pause as a `Duration`
    pub fn sample_pause(&self) -> Duration {
        Duration::from_millis(self.sample_pause_ms)
    }

    /// Resync interval as a `Duration`
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_s)
    }
}

/// Calibration run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Minimum number of samples for a run to be analysed
    pub min_samples: usize,
    /// Capacity of the flash timestamp hand-off queue
    pub flash_queue_capacity: usize,
    /// Upper bound for joining the worker on stop (ms)
    pub stop_timeout_ms: u64,
    /// Override the tier-selected run duration (s)
    pub run_duration_override_s: Option<f64>,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            min_samples: 10,
            flash_queue_capacity: 16,
            stop_timeout_ms: 2_000,
            run_duration_override_s: None,
        }
    }
}

impl CalibrationSettings {
    /// Stop timeout as a `Duration`
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Compensation store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompensationSettings {
    /// File holding the persisted compensation triple
    pub state_path: PathBuf,
    /// Refresh rate used for the heuristic when the display cannot be queried
    pub fallback_refresh_hz: f64,
}

impl Default for CompensationSettings {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("truetime-compensation.json"),
            fallback_refresh_hz: 60.0,
        }
    }
}
