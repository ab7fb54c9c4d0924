//! Robust delay statistics over a calibration run.
//!
//! Median / MAD outlier rejection, then mean and population standard deviation
//! over the surviving samples. The median of an even-length list is the
//! lower-middle element, not the average of the two middle elements.

use contracts::{CalibrationResult, CalibrationSample};
use tracing::debug;

use crate::error::{CalibrationError, Result};

/// Scales a MAD to a standard deviation under a normal distribution
pub const MAD_SCALE: f64 = 1.4826;

/// Lower-middle element of an already sorted slice
#[inline]
fn lower_median(sorted: &[f64]) -> f64 {
    sorted[(sorted.len() - 1) / 2]
}

fn sorted(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.into_iter().collect();
    // Stable: equal delays keep their input order
    values.sort_by(f64::total_cmp);
    values
}

/// Analyse a run
///
/// Samples with `|delay - median| <= outlier_sigma * MAD * 1.4826` are kept.
///
/// # Errors
/// - `NoSamples` for an empty input
/// - `AllRejected` when nothing survives the bound
pub fn analyze(samples: &[CalibrationSample], outlier_sigma: f64) -> Result<CalibrationResult> {
    if samples.is_empty() {
        return Err(CalibrationError::NoSamples);
    }

    let delays: Vec<f64> = samples.iter().map(CalibrationSample::delay_ms).collect();

    let median = lower_median(&sorted(delays.iter().copied()));
    let mad = lower_median(&sorted(delays.iter().map(|d| (d - median).abs())));
    let bound = outlier_sigma * mad * MAD_SCALE;

    let kept = sorted(
        delays
            .iter()
            .copied()
            .filter(|d| (d - median).abs() <= bound),
    );
    if kept.is_empty() {
        return Err(CalibrationError::AllRejected {
            total: delays.len(),
        });
    }

    let n = kept.len() as f64;
    let mean = kept.iter().sum::<f64>() / n;
    let variance = kept.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    let result = CalibrationResult {
        median_delay_ms: lower_median(&kept),
        mean_delay_ms: mean,
        std_dev_ms: std_dev,
        sample_count: kept.len(),
        outlier_count: delays.len() - kept.len(),
        estimated_precision_ms: std_dev / n.sqrt(),
    };

    debug!(
        median_ms = result.median_delay_ms,
        mad_ms = mad,
        kept = result.sample_count,
        outliers = result.outlier_count,
        "calibration analysed"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(delays_ms: &[f64]) -> Vec<CalibrationSample> {
        delays_ms
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let flash = i as i64 * 250_000_000;
                CalibrationSample {
                    flash_timestamp_nanos: flash,
                    camera_timestamp_nanos: flash + (d * 1_000_000.0).round() as i64,
                    brightness: 0.9,
                }
            })
            .collect()
    }

    #[test]
    fn test_single_outlier_rejected() {
        let input = samples(&[10.0, 10.2, 9.8, 10.1, 50.0, 9.9, 10.0, 10.3, 9.7, 10.0]);
        let result = analyze(&input, 2.5).unwrap();

        assert_eq!(result.outlier_count, 1);
        assert_eq!(result.sample_count, 9);
        assert!((result.median_delay_ms - 10.0).abs() < 1e-9);
        assert!((result.mean_delay_ms - 10.0).abs() < 1e-9);
        // 50 ms would push the stddev far above 1 ms
        assert!(result.std_dev_ms < 0.2);
        let expected_precision = result.std_dev_ms / 3.0;
        assert!((result.estimated_precision_ms - expected_precision).abs() < 1e-12);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(analyze(&[], 2.5), Err(CalibrationError::NoSamples));
    }

    #[test]
    fn test_all_rejected() {
        // Any finite spread is beyond a negative bound
        let input = samples(&[1.0, 2.0, 3.0]);
        assert_eq!(
            analyze(&input, -1.0),
            Err(CalibrationError::AllRejected { total: 3 })
        );
    }

    #[test]
    fn test_lower_middle_median() {
        let input = samples(&[4.0, 1.0, 3.0, 2.0]);
        let result = analyze(&input, 10.0).unwrap();
        assert!((result.median_delay_ms - 2.0).abs() < 1e-9);
        assert_eq!(result.outlier_count, 0);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        // median 10, deviations [0, 0, 2, 2, 0] -> MAD 0 -> only exact medians kept
        let input = samples(&[10.0, 10.0, 12.0, 8.0, 10.0]);
        let result = analyze(&input, 3.0).unwrap();
        assert_eq!(result.sample_count, 3);
        assert_eq!(result.outlier_count, 2);
        assert_eq!(result.std_dev_ms, 0.0);
    }

    #[test]
    fn test_single_sample() {
        let result = analyze(&samples(&[16.5]), 2.5).unwrap();
        assert_eq!(result.sample_count, 1);
        assert!((result.median_delay_ms - 16.5).abs() < 1e-9);
        assert_eq!(result.estimated_precision_ms, 0.0);
    }
}
