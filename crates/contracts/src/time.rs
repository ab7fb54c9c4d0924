//! PreciseTime / SyncResult - clock and sync engine output
//!
//! Nanosecond-resolution time values and the outcome of one SNTP burst.

use serde::{Deserialize, Serialize};

/// Nanoseconds per millisecond
pub const NANOS_PER_MILLI: i64 = 1_000_000;

/// Nanoseconds per microsecond
pub const NANOS_PER_MICRO: i64 = 1_000;

/// Nanoseconds per second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// True time split into millisecond / microsecond / nanosecond components
///
/// `epoch_millis` counts milliseconds since 1970-01-01T00:00:00Z. The two
/// sub-millisecond components are always in `0..=999`, also for instants
/// before the epoch (floor division).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PreciseTime {
    /// Milliseconds since the Unix epoch
    pub epoch_millis: i64,

    /// Microseconds within the current millisecond (0-999)
    pub sub_milli_micros: u16,

    /// Nanoseconds within the current microsecond (0-999)
    pub sub_micro_nanos: u16,
}

impl PreciseTime {
    /// Build from nanoseconds since the Unix epoch
    #[inline]
    pub fn from_unix_nanos(nanos: i64) -> Self {
        let epoch_millis = nanos.div_euclid(NANOS_PER_MILLI);
        let rem = nanos.rem_euclid(NANOS_PER_MILLI);
        Self {
            epoch_millis,
            sub_milli_micros: (rem / NANOS_PER_MICRO) as u16,
            sub_micro_nanos: (rem % NANOS_PER_MICRO) as u16,
        }
    }

    /// Reconstruct nanoseconds since the Unix epoch
    #[inline]
    pub fn as_unix_nanos(&self) -> i64 {
        self.epoch_millis * NANOS_PER_MILLI
            + self.sub_milli_micros as i64 * NANOS_PER_MICRO
            + self.sub_micro_nanos as i64
    }

    /// Shift by a signed number of nanoseconds
    #[inline]
    pub fn add_nanos(&self, nanos: i64) -> Self {
        Self::from_unix_nanos(self.as_unix_nanos().saturating_add(nanos))
    }

    /// Microseconds since the Unix epoch (truncated toward negative infinity)
    pub fn epoch_micros(&self) -> i64 {
        self.epoch_millis * 1_000 + self.sub_milli_micros as i64
    }
}

/// One request/response exchange of an SNTP burst
///
/// `t1_nanos` and `t4_nanos` are local monotonic readings; `t3_unix_nanos` is
/// the server transmit timestamp converted to Unix nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSample {
    /// Local monotonic time right before the request was sent
    pub t1_nanos: i64,
    /// Server transmit timestamp (Unix nanoseconds)
    pub t3_unix_nanos: i64,
    /// Local monotonic time right after the response arrived
    pub t4_nanos: i64,
    /// Round trip time `t4 - t1`
    pub rtt_nanos: i64,
    /// `(t3 + rtt / 2) - t4`
    pub offset_nanos: i64,
}

impl SyncSample {
    /// Derive RTT and offset from the three timestamps, assuming a symmetric path
    pub fn from_timestamps(t1_nanos: i64, t3_unix_nanos: i64, t4_nanos: i64) -> Self {
        let rtt_nanos = t4_nanos - t1_nanos;
        let true_time_at_t4 = t3_unix_nanos + rtt_nanos / 2;
        Self {
            t1_nanos,
            t3_unix_nanos,
            t4_nanos,
            rtt_nanos,
            offset_nanos: true_time_at_t4 - t4_nanos,
        }
    }
}

/// Result of one successful SNTP burst
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Committed offset (true - monotonic), nanoseconds
    pub offset_nanos: i64,

    /// RTT of the selected sample, nanoseconds
    pub rtt_nanos: i64,

    /// Server the burst was exchanged with
    pub server: String,

    /// True time at which the selected sample completed (ms since epoch)
    pub wall_clock_epoch_millis: i64,

    /// Number of successful attempts in the burst
    pub samples_used: u32,
}

impl SyncResult {
    /// Offset in milliseconds (for logging)
    pub fn offset_ms(&self) -> f64 {
        self.offset_nanos as f64 / NANOS_PER_MILLI as f64
    }

    /// RTT in milliseconds (for logging)
    pub fn rtt_ms(&self) -> f64 {
        self.rtt_nanos as f64 / NANOS_PER_MILLI as f64
    }
}
