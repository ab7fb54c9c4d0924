//! Display delay compensation store.
//!
//! Holds the `{delay, precision, calibrated_at}` triple. Writers are
//! serialised and persist before publishing; readers copy the whole triple
//! under a read lock, so they never observe a mix of two writes.

use std::sync::Arc;

use contracts::{
    CalibrationResult, CompensationSettings, CompensationState, DisplayInfo, PreciseTime,
    StatePersistence, PRECISION_UNKNOWN,
};
use parking_lot::{Mutex, RwLock};
use sync_engine::PreciseClock;
use tracing::{info, instrument, warn};

use crate::error::Result;

/// Extra latency added on top of two frame intervals by the heuristic
const HEURISTIC_BASE_MS: f64 = 10.0;

/// Heuristic delay for a display refreshing at `refresh_hz`
///
/// `2 × frame interval + 10 ms`, clamped into the accepted range.
pub fn heuristic_delay_nanos(refresh_hz: f64) -> i64 {
    CompensationState::clamp_delay_ms(2.0 * (1_000.0 / refresh_hz) + HEURISTIC_BASE_MS)
}

fn now_epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Compensation store
pub struct CompensationStore {
    clock: PreciseClock,
    persistence: Arc<dyn StatePersistence>,
    display: Arc<dyn DisplayInfo>,
    fallback_refresh_hz: f64,
    state: RwLock<CompensationState>,
    /// Serialises persist-then-publish
    writer: Mutex<()>,
}

impl std::fmt::Debug for CompensationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompensationStore")
            .field("state", &*self.state.read())
            .field("fallback_refresh_hz", &self.fallback_refresh_hz)
            .finish()
    }
}

impl CompensationStore {
    /// Create a store, loading any persisted state
    ///
    /// A missing or unreadable persisted state falls back to the heuristic.
    pub fn new(
        clock: PreciseClock,
        persistence: Arc<dyn StatePersistence>,
        display: Arc<dyn DisplayInfo>,
        settings: &CompensationSettings,
    ) -> Self {
        let store = Self {
            clock,
            persistence,
            display,
            fallback_refresh_hz: settings.fallback_refresh_hz,
            state: RwLock::new(CompensationState {
                delay_nanos: 0,
                precision_ms: PRECISION_UNKNOWN,
                calibrated_at_epoch_millis: 0,
            }),
            writer: Mutex::new(()),
        };

        let initial = match store.persistence.load() {
            Ok(Some(state)) => CompensationState {
                delay_nanos: CompensationState::clamp_delay_nanos(state.delay_nanos),
                ..state
            },
            Ok(None) => store.heuristic_state(),
            Err(e) => {
                warn!(error = %e, "persisted compensation unreadable, using heuristic");
                store.heuristic_state()
            }
        };
        *store.state.write() = initial;
        store
    }

    fn refresh_rate_hz(&self) -> f64 {
        let hz = self.display.refresh_rate_hz();
        if hz.is_finite() && hz > 0.0 {
            hz
        } else {
            self.fallback_refresh_hz
        }
    }

    fn heuristic_state(&self) -> CompensationState {
        CompensationState {
            delay_nanos: heuristic_delay_nanos(self.refresh_rate_hz()),
            precision_ms: PRECISION_UNKNOWN,
            calibrated_at_epoch_millis: 0,
        }
    }

    fn persist_and_publish(&self, state: CompensationState) -> Result<CompensationState> {
        let _writer = self.writer.lock();
        self.persistence.save(&state)?;
        *self.state.write() = state;
        Ok(state)
    }

    /// Adopt a calibration result
    ///
    /// The median delay is clamped to `[0, 100 ms]`.
    #[instrument(name = "compensation_accept", skip(self, result), fields(median_ms = result.median_delay_ms))]
    pub fn accept(&self, result: &CalibrationResult) -> Result<CompensationState> {
        let state = self.persist_and_publish(CompensationState {
            delay_nanos: CompensationState::clamp_delay_ms(result.median_delay_ms),
            precision_ms: result.estimated_precision_ms,
            calibrated_at_epoch_millis: now_epoch_millis(),
        })?;
        info!(
            delay_ms = state.delay_ms(),
            precision_ms = state.precision_ms,
            "calibrated delay stored"
        );
        Ok(state)
    }

    /// Set the delay by hand; precision becomes unknown
    #[instrument(name = "compensation_set_manual", skip(self))]
    pub fn set_manual(&self, delay_ms: f64) -> Result<CompensationState> {
        let state = self.persist_and_publish(CompensationState {
            delay_nanos: CompensationState::clamp_delay_ms(delay_ms),
            precision_ms: PRECISION_UNKNOWN,
            calibrated_at_epoch_millis: now_epoch_millis(),
        })?;
        info!(delay_ms = state.delay_ms(), "manual delay stored");
        Ok(state)
    }

    /// Forget any calibration and fall back to the heuristic
    ///
    /// The heuristic is not persisted.
    #[instrument(name = "compensation_reset", skip(self))]
    pub fn reset(&self) -> Result<CompensationState> {
        let _writer = self.writer.lock();
        self.persistence.clear()?;
        let state = self.heuristic_state();
        *self.state.write() = state;
        info!(delay_ms = state.delay_ms(), "compensation reset to heuristic");
        Ok(state)
    }

    /// True time plus the display delay
    ///
    /// # Errors
    /// `NotSynced` until the clock has an offset.
    #[inline]
    pub fn compensated_now(&self) -> Result<PreciseTime> {
        let now = self.clock.now()?;
        Ok(now.add_nanos(self.state.read().delay_nanos))
    }

    /// Consistent copy of the whole triple
    pub fn snapshot(&self) -> CompensationState {
        *self.state.read()
    }

    /// Current delay in milliseconds
    pub fn current_delay_ms(&self) -> f64 {
        self.snapshot().delay_ms()
    }

    /// Whether the delay came from a calibration or a manual override
    pub fn is_calibrated(&self) -> bool {
        self.snapshot().is_calibrated()
    }

    /// Clock used by `compensated_now`
    pub fn clock(&self) -> &PreciseClock {
        &self.clock
    }
}
