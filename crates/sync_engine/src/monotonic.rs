//! Monotonic time sources.
//!
//! Every local timestamp in truetime (SNTP T1/T4, flash emission, camera
//! capture) is read from one `MonotonicSource` so they share a clock domain.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

/// A monotonic nanosecond clock
pub trait MonotonicSource: Send + Sync {
    /// Nanoseconds since an arbitrary, fixed origin; never decreases
    fn now_nanos(&self) -> i64;
}

/// OS monotonic clock anchored at construction
#[derive(Debug, Clone, Copy)]
pub struct SystemMonotonic {
    origin: Instant,
}

impl SystemMonotonic {
    /// Create a clock whose origin is "now"
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemMonotonic {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicSource for SystemMonotonic {
    #[inline]
    fn now_nanos(&self) -> i64 {
        self.origin.elapsed().as_nanos() as i64
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicI64,
}

impl ManualClock {
    /// Create a clock reading `start_nanos`
    pub fn new(start_nanos: i64) -> Self {
        Self {
            nanos: AtomicI64::new(start_nanos),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.nanos
            .fetch_add(by.as_nanos() as i64, Ordering::SeqCst);
    }

    /// Move the clock forward by raw nanoseconds
    pub fn advance_nanos(&self, nanos: i64) {
        self.nanos.fetch_add(nanos.max(0), Ordering::SeqCst);
    }

    /// Set an absolute reading; ignored if it would move backwards
    pub fn set(&self, nanos: i64) {
        self.nanos.fetch_max(nanos, Ordering::SeqCst);
    }
}

impl MonotonicSource for ManualClock {
    #[inline]
    fn now_nanos(&self) -> i64 {
        self.nanos.load(Ordering::SeqCst)
    }
}
