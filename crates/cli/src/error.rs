//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Every burst against every server failed
    #[error("Sync failed: {message}")]
    SyncFailed { message: String },

    /// Calibration run ended in an error state
    #[error("Calibration failed: {message}")]
    Calibration { message: String },

    /// Only the simulated rig is built into this binary
    #[error("No camera backend available; run with --simulate")]
    NoCameraBackend,
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn sync_failed(message: impl Into<String>) -> Self {
        Self::SyncFailed {
            message: message.into(),
        }
    }

    pub fn calibration(message: impl Into<String>) -> Self {
        Self::Calibration {
            message: message.into(),
        }
    }
}
