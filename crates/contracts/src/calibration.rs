//! Calibration contracts
//!
//! Samples, aggregate result, run parameters and the run state machine.

use serde::{Deserialize, Serialize};

use crate::NANOS_PER_MILLI;

/// One flash paired with the camera frame that observed it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    /// Monotonic timestamp at which the flash was emitted
    pub flash_timestamp_nanos: i64,

    /// Monotonic capture timestamp of the paired camera frame
    pub camera_timestamp_nanos: i64,

    /// Brightness of the frame that triggered detection (0-1)
    pub brightness: f32,
}

impl CalibrationSample {
    /// Display delay of this sample in milliseconds
    #[inline]
    pub fn delay_ms(&self) -> f64 {
        (self.camera_timestamp_nanos - self.flash_timestamp_nanos) as f64 / NANOS_PER_MILLI as f64
    }
}

/// Aggregate outcome of a calibration run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// Median delay over the filtered samples
    pub median_delay_ms: f64,
    /// Mean delay over the filtered samples
    pub mean_delay_ms: f64,
    /// Population standard deviation over the filtered samples
    pub std_dev_ms: f64,
    /// Number of samples kept after outlier rejection
    pub sample_count: usize,
    /// Number of samples rejected as outliers
    pub outlier_count: usize,
    /// Standard error of the mean (`std_dev / sqrt(sample_count)`)
    pub estimated_precision_ms: f64,
}

/// Camera capability tier, selected from the measured frame rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraTier {
    /// 240 fps and above
    HighSpeed,
    /// 120 fps and above
    Fast,
    /// 60 fps and above
    Standard,
    /// Anything slower
    Basic,
}

impl CameraTier {
    /// Classify a measured camera frame rate
    pub fn from_fps(fps: f64) -> Self {
        if fps >= 240.0 {
            Self::HighSpeed
        } else if fps >= 120.0 {
            Self::Fast
        } else if fps >= 60.0 {
            Self::Standard
        } else {
            Self::Basic
        }
    }

    /// Run parameters for this tier
    pub fn params(self) -> CalibrationParams {
        match self {
            Self::HighSpeed => CalibrationParams {
                flash_duration_ms: 20,
                flash_period_ms: 250,
                run_duration_secs: 10.0,
                target_sample_count: 40,
                expected_precision_ms: 2.0,
                brightness_threshold: 0.6,
                outlier_sigma: 3.0,
            },
            Self::Fast => CalibrationParams {
                flash_duration_ms: 33,
                flash_period_ms: 300,
                run_duration_secs: 12.0,
                target_sample_count: 35,
                expected_precision_ms: 4.0,
                brightness_threshold: 0.6,
                outlier_sigma: 3.0,
            },
            Self::Standard => CalibrationParams {
                flash_duration_ms: 50,
                flash_period_ms: 400,
                run_duration_secs: 15.0,
                target_sample_count: 30,
                expected_precision_ms: 8.0,
                brightness_threshold: 0.55,
                outlier_sigma: 2.5,
            },
            Self::Basic => CalibrationParams {
                flash_duration_ms: 100,
                flash_period_ms: 500,
                run_duration_secs: 20.0,
                target_sample_count: 25,
                expected_precision_ms: 17.0,
                brightness_threshold: 0.5,
                outlier_sigma: 2.5,
            },
        }
    }
}

/// Constants for one calibration run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParams {
    /// How long each flash stays lit
    pub flash_duration_ms: u64,
    /// Time between flash starts
    pub flash_period_ms: u64,
    /// Recording duration
    pub run_duration_secs: f64,
    /// Number of samples the run aims for
    pub target_sample_count: usize,
    /// Precision the tier is expected to reach
    pub expected_precision_ms: f64,
    /// Brightness (0-1) above which a frame counts as lit
    pub brightness_threshold: f32,
    /// Outlier rejection bound in (MAD-derived) standard deviations
    pub outlier_sigma: f64,
}

impl CalibrationParams {
    /// Parameters for a camera running at `fps`
    pub fn for_fps(fps: f64) -> Self {
        CameraTier::from_fps(fps).params()
    }
}

impl Default for CalibrationParams {
    fn default() -> Self {
        CameraTier::Standard.params()
    }
}

/// Calibration run state
///
/// Consumers match exhaustively; only `Completed` carries a result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CalibrationState {
    /// No run active
    #[default]
    Idle,
    /// Capture pipeline is starting
    Initializing,
    /// Flashes are being recorded
    Recording {
        /// Elapsed fraction of the run (0-1)
        progress: f32,
        /// Samples collected so far
        sample_count: usize,
    },
    /// Samples are being analysed
    Analyzing {
        /// Analysis progress (0-1)
        progress: f32,
    },
    /// Run finished with a result
    Completed {
        /// Aggregate result
        result: CalibrationResult,
    },
    /// Run failed; terminal for this run
    Error {
        /// Human readable reason
        message: String,
    },
}

impl CalibrationState {
    /// Whether a run is currently active
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Initializing | Self::Recording { .. } | Self::Analyzing { .. }
        )
    }
}
