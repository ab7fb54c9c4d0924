//! Metric recorders and in-memory statistics.

use std::collections::HashMap;

use contracts::{CalibrationResult, CompensationState, SyncResult};
use metrics::{counter, gauge, histogram};

/// Record a committed sync result
///
/// # Example
///
/// ```ignore
/// if let Some(result) = service.trigger_sync() {
///     observability::metrics::record_sync_result(&result);
/// }
/// ```
pub fn record_sync_result(result: &SyncResult) {
    counter!("truetime_sync_success_total", "server" => result.server.clone()).increment(1);
    gauge!("truetime_sync_last_success_epoch_ms").set(result.wall_clock_epoch_millis as f64);
    gauge!("truetime_sync_samples_used").set(f64::from(result.samples_used));
    histogram!("truetime_sync_offset_abs_ms").record(result.offset_ms().abs());
}

/// Record a failed sync against `server`
pub fn record_sync_failure(server: &str) {
    counter!("truetime_sync_server_failures_total", "server" => server.to_string()).increment(1);
}

/// Record the outcome of a calibration run
pub fn record_calibration_result(result: &CalibrationResult) {
    gauge!("truetime_calibration_median_ms").set(result.median_delay_ms);
    gauge!("truetime_calibration_precision_ms").set(result.estimated_precision_ms);
    gauge!("truetime_calibration_samples").set(result.sample_count as f64);
    gauge!("truetime_calibration_outliers").set(result.outlier_count as f64);
}

/// Record the active compensation
pub fn record_compensation_delay(state: &CompensationState) {
    gauge!("truetime_compensation_delay_ms").set(state.delay_ms());
    gauge!("truetime_compensation_calibrated").set(if state.is_calibrated() { 1.0 } else { 0.0 });
}

/// Sync statistics aggregator
///
/// Aggregates results in memory for the `watch` summary.
#[derive(Debug, Clone, Default)]
pub struct SyncStatsAggregator {
    /// Successful syncs
    pub total_syncs: u64,

    /// Failed syncs
    pub failed_syncs: u64,

    /// Committed offsets (ms)
    pub offset_stats: RunningStats,

    /// Selected-sample RTTs (ms)
    pub rtt_stats: RunningStats,

    /// Change of offset between consecutive syncs (ms)
    pub drift_stats: RunningStats,

    /// Successful syncs per server
    pub server_counts: HashMap<String, u64>,

    last_offset_ms: Option<f64>,
}

impl SyncStatsAggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a successful sync
    pub fn update(&mut self, result: &SyncResult) {
        self.total_syncs += 1;
        *self.server_counts.entry(result.server.clone()).or_insert(0) += 1;

        let offset_ms = result.offset_ms();
        self.offset_stats.push(offset_ms);
        self.rtt_stats.push(result.rtt_ms());
        if let Some(last) = self.last_offset_ms.replace(offset_ms) {
            self.drift_stats.push(offset_ms - last);
        }
    }

    /// Add a failed sync
    pub fn record_failure(&mut self) {
        self.failed_syncs += 1;
    }

    /// Summary report
    pub fn summary(&self) -> SyncSummary {
        let attempts = self.total_syncs + self.failed_syncs;
        SyncSummary {
            total_syncs: self.total_syncs,
            failed_syncs: self.failed_syncs,
            failure_rate: if attempts > 0 {
                self.failed_syncs as f64 / attempts as f64 * 100.0
            } else {
                0.0
            },
            offset_ms: StatsSummary::from(&self.offset_stats),
            rtt_ms: StatsSummary::from(&self.rtt_stats),
            drift_ms: StatsSummary::from(&self.drift_stats),
            server_counts: self.server_counts.clone(),
        }
    }

    /// Clear all statistics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Sync summary
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub total_syncs: u64,
    pub failed_syncs: u64,
    pub failure_rate: f64,
    pub offset_ms: StatsSummary,
    pub rtt_ms: StatsSummary,
    pub drift_ms: StatsSummary,
    pub server_counts: HashMap<String, u64>,
}

impl std::fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Sync Summary ===")?;
        writeln!(f, "Successful syncs: {}", self.total_syncs)?;
        writeln!(
            f,
            "Failed syncs: {} ({:.2}%)",
            self.failed_syncs, self.failure_rate
        )?;
        writeln!(f, "Offset (ms): {}", self.offset_ms)?;
        writeln!(f, "RTT (ms): {}", self.rtt_ms)?;
        writeln!(f, "Drift between syncs (ms): {}", self.drift_ms)?;

        if !self.server_counts.is_empty() {
            let mut servers: Vec<_> = self.server_counts.iter().collect();
            servers.sort();
            writeln!(f, "Servers:")?;
            for (server, count) in servers {
                writeln!(f, "  {}: {}", server, count)?;
            }
        }

        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online mean / variance (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// Add a value
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Number of values
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean, 0 when empty
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// Sample standard deviation
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Smallest value
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Largest value
    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(server: &str, offset_ms: f64, rtt_ms: f64) -> SyncResult {
        SyncResult {
            offset_nanos: (offset_ms * 1e6) as i64,
            rtt_nanos: (rtt_ms * 1e6) as i64,
            server: server.to_string(),
            wall_clock_epoch_millis: 1_700_000_000_000,
            samples_used: 5,
        }
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(value);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = SyncStatsAggregator::new();
        aggregator.update(&result("a.example", 10.0, 20.0));
        aggregator.update(&result("a.example", 12.0, 18.0));
        aggregator.update(&result("b.example", 11.0, 30.0));
        aggregator.record_failure();

        assert_eq!(aggregator.total_syncs, 3);
        assert_eq!(aggregator.failed_syncs, 1);
        assert_eq!(aggregator.server_counts.get("a.example"), Some(&2));
        assert_eq!(aggregator.drift_stats.count(), 2);
        assert!((aggregator.rtt_stats.min() - 18.0).abs() < 1e-9);

        let summary = aggregator.summary();
        assert!((summary.failure_rate - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = SyncStatsAggregator::new();
        aggregator.update(&result("time.example", 3.0, 12.0));
        let output = aggregator.summary().to_string();

        assert!(output.contains("Successful syncs: 1"));
        assert!(output.contains("0.00%"));
        assert!(output.contains("time.example: 1"));
        assert!(output.contains("Drift between syncs (ms): N/A"));
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: calls are no-ops
        record_sync_result(&result("x", 1.0, 2.0));
        record_sync_failure("x");
        record_compensation_delay(&CompensationState {
            delay_nanos: 1_000_000,
            precision_ms: -1.0,
            calibrated_at_epoch_millis: 0,
        });
    }
}
