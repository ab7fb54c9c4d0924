//! Calibration error types

use thiserror::Error;

/// Calibration error
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    /// Analysis was asked to run over an empty sample list
    #[error("no calibration samples")]
    NoSamples,

    /// Every sample fell outside the outlier bound
    #[error("all {total} samples rejected as outliers")]
    AllRejected {
        /// Samples presented to the analyzer
        total: usize,
    },

    /// The run ended with too few paired flashes
    #[error("insufficient samples: collected {collected}, required {required}")]
    InsufficientSamples {
        /// Samples collected during the run
        collected: usize,
        /// Minimum needed for analysis
        required: usize,
    },

    /// Camera capture could not be started
    #[error("capture failed: {message}")]
    Capture {
        /// Error message
        message: String,
    },

    /// `start_calibration` was called while a run is active
    #[error("a calibration run is already active")]
    AlreadyRunning,
}

/// Calibration Result type alias
pub type Result<T> = std::result::Result<T, CalibrationError>;
