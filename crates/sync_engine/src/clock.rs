//! PreciseClock - fast read path for true time.
//!
//! One monotonic read plus one atomic load; no I/O, no locks, no allocation.
//! Safe to call every rendered frame from any number of threads.

use std::sync::Arc;

use contracts::PreciseTime;

use crate::error::ClockError;
use crate::monotonic::MonotonicSource;
use crate::register::OffsetRegister;

/// Monotonic clock + committed offset
#[derive(Clone)]
pub struct PreciseClock {
    monotonic: Arc<dyn MonotonicSource>,
    register: Arc<OffsetRegister>,
}

impl std::fmt::Debug for PreciseClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreciseClock")
            .field("offset_nanos", &self.register.load())
            .finish()
    }
}

impl PreciseClock {
    /// Create a clock reading `monotonic` corrected by `register`
    pub fn new(monotonic: Arc<dyn MonotonicSource>, register: Arc<OffsetRegister>) -> Self {
        Self {
            monotonic,
            register,
        }
    }

    /// True time in Unix nanoseconds, `None` until the first sync
    #[inline]
    pub fn unix_nanos(&self) -> Option<i64> {
        let offset = self.register.load()?;
        Some(self.monotonic.now_nanos().saturating_add(offset))
    }

    /// Current true time
    ///
    /// # Errors
    /// `ClockError::NotSynced` if no offset has ever been committed.
    #[inline]
    pub fn now(&self) -> Result<PreciseTime, ClockError> {
        self.unix_nanos()
            .map(PreciseTime::from_unix_nanos)
            .ok_or(ClockError::NotSynced)
    }

    /// Non-failing variant of [`now`](Self::now) for UI polling
    #[inline]
    pub fn now_or_none(&self) -> Option<PreciseTime> {
        self.now().ok()
    }

    /// Whether an offset has been committed
    pub fn is_synced(&self) -> bool {
        self.register.is_synced()
    }

    /// Underlying monotonic clock
    pub fn monotonic(&self) -> &Arc<dyn MonotonicSource> {
        &self.monotonic
    }
}
