//! Compensation contracts
//!
//! Persisted delay state plus the storage and display collaborators.

use serde::{Deserialize, Serialize};

use crate::{ContractError, NANOS_PER_MILLI};

/// Upper bound for any stored display delay
pub const MAX_DELAY_NANOS: i64 = 100 * NANOS_PER_MILLI;

/// Precision sentinel meaning "not measured" (manual or heuristic delay)
pub const PRECISION_UNKNOWN: f64 = -1.0;

/// Persisted compensation triple
///
/// Written and read as one unit; `calibrated_at_epoch_millis == 0` means the
/// delay was never calibrated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompensationState {
    /// Display delay in nanoseconds, within `[0, MAX_DELAY_NANOS]`
    pub delay_nanos: i64,

    /// Precision of the delay in milliseconds, or `PRECISION_UNKNOWN`
    pub precision_ms: f64,

    /// Wall-clock time of the last calibration (ms since epoch), 0 if never
    #[serde(default)]
    pub calibrated_at_epoch_millis: i64,
}

impl CompensationState {
    /// Clamp a delay in nanoseconds into the accepted range
    #[inline]
    pub fn clamp_delay_nanos(delay_nanos: i64) -> i64 {
        delay_nanos.clamp(0, MAX_DELAY_NANOS)
    }

    /// Convert a delay in milliseconds to clamped nanoseconds
    ///
    /// Non-finite input clamps to zero.
    pub fn clamp_delay_ms(delay_ms: f64) -> i64 {
        if !delay_ms.is_finite() {
            return 0;
        }
        let nanos = (delay_ms * NANOS_PER_MILLI as f64).round();
        Self::clamp_delay_nanos(nanos.clamp(i64::MIN as f64, i64::MAX as f64) as i64)
    }

    /// Delay in milliseconds
    pub fn delay_ms(&self) -> f64 {
        self.delay_nanos as f64 / NANOS_PER_MILLI as f64
    }

    /// Whether the state came from a calibration or manual override
    pub fn is_calibrated(&self) -> bool {
        self.calibrated_at_epoch_millis != 0
    }

    /// Measured precision, if known
    pub fn precision(&self) -> Option<f64> {
        (self.precision_ms >= 0.0).then_some(self.precision_ms)
    }
}

/// Storage for the compensation triple
///
/// Implementations must make `save` atomic: a concurrent `load` sees either
/// the previous or the new state, never a mix.
pub trait StatePersistence: Send + Sync {
    /// Read the stored state, `None` if nothing was stored
    fn load(&self) -> Result<Option<CompensationState>, ContractError>;

    /// Replace the stored state
    fn save(&self, state: &CompensationState) -> Result<(), ContractError>;

    /// Remove the stored state
    fn clear(&self) -> Result<(), ContractError>;
}

/// Host display information
pub trait DisplayInfo: Send + Sync {
    /// Refresh rate of the display in Hz
    fn refresh_rate_hz(&self) -> f64;
}

/// Display with a fixed, known refresh rate
#[derive(Debug, Clone, Copy)]
pub struct FixedDisplay {
    refresh_rate_hz: f64,
}

impl FixedDisplay {
    /// Create a display reporting `refresh_rate_hz`
    pub fn new(refresh_rate_hz: f64) -> Self {
        Self { refresh_rate_hz }
    }
}

impl DisplayInfo for FixedDisplay {
    fn refresh_rate_hz(&self) -> f64 {
        self.refresh_rate_hz
    }
}
