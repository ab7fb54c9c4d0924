//! Flash / frame correlation.
//!
//! Detects rising brightness edges in the camera stream and pairs each with
//! the oldest pending flash timestamp. The pair is completed with the capture
//! timestamp of the frame *after* the detecting one, so every sample carries
//! the same one-frame pipeline term.

use contracts::CalibrationSample;
use tracing::trace;

use crate::queue::FlashQueue;

/// What one frame did to the sampler
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// Nothing happened
    Ignored,
    /// Rising edge matched with a flash; waiting for the next frame
    Detected,
    /// Rising edge with no pending flash
    Unmatched,
    /// Pair completed
    Paired(CalibrationSample),
    /// Pair dropped because the camera timestamp precedes the flash
    Discarded,
}

/// Rising-edge detector with hysteresis
#[derive(Debug, Clone)]
pub struct CalibrationSampler {
    threshold: f32,
    last_brightness: f32,
    /// Set on a matched rising edge, cleared once the frame falls back below
    /// half the threshold after pairing
    flash_in_flight: bool,
    /// Flash timestamp and detecting brightness awaiting the next frame
    pending: Option<(i64, f32)>,
    samples: Vec<CalibrationSample>,
    unmatched: u64,
    discarded: u64,
}

impl CalibrationSampler {
    /// Create a sampler for the given brightness threshold (0-1)
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            last_brightness: 0.0,
            flash_in_flight: false,
            pending: None,
            samples: Vec::new(),
            unmatched: 0,
            discarded: 0,
        }
    }

    /// Feed one frame
    pub fn on_frame(
        &mut self,
        brightness: f32,
        timestamp_nanos: i64,
        flashes: &FlashQueue,
    ) -> FrameOutcome {
        let low = 0.5 * self.threshold;
        let mut outcome = FrameOutcome::Ignored;

        if let Some((flash_ts, detected_brightness)) = self.pending.take() {
            if timestamp_nanos < flash_ts {
                self.discarded += 1;
                trace!(flash_ts, timestamp_nanos, "pair discarded, camera before flash");
                outcome = FrameOutcome::Discarded;
            } else {
                let sample = CalibrationSample {
                    flash_timestamp_nanos: flash_ts,
                    camera_timestamp_nanos: timestamp_nanos,
                    brightness: detected_brightness,
                };
                trace!(delay_ms = sample.delay_ms(), "flash paired");
                self.samples.push(sample);
                outcome = FrameOutcome::Paired(sample);
            }
        }

        // The completing frame may already be dark; a lit frame here cannot
        // start a new edge because the flash is still in flight.
        if self.flash_in_flight && brightness < low {
            self.flash_in_flight = false;
        } else if !self.flash_in_flight
            && brightness > self.threshold
            && self.last_brightness < low
        {
            match flashes.try_pop() {
                Some(flash_ts) => {
                    self.pending = Some((flash_ts, brightness));
                    self.flash_in_flight = true;
                    outcome = FrameOutcome::Detected;
                }
                None => {
                    self.unmatched += 1;
                    trace!(timestamp_nanos, "rising edge without pending flash");
                    outcome = FrameOutcome::Unmatched;
                }
            }
        }

        self.last_brightness = brightness;
        outcome
    }

    /// Samples collected so far
    pub fn samples(&self) -> &[CalibrationSample] {
        &self.samples
    }

    /// Number of samples collected so far
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Move the collected samples out, leaving the sampler empty
    pub fn take_samples(&mut self) -> Vec<CalibrationSample> {
        std::mem::take(&mut self.samples)
    }

    /// Rising edges that found no pending flash
    pub fn unmatched(&self) -> u64 {
        self.unmatched
    }

    /// Pairs dropped for a camera timestamp earlier than the flash
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Brightness threshold in use
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Clear all state and adopt a new threshold
    pub fn reset(&mut self, threshold: f32) {
        *self = Self::new(threshold);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: i64 = 1_000_000;

    #[test]
    fn test_pairs_with_next_frame() {
        let queue = FlashQueue::new(4);
        let mut sampler = CalibrationSampler::new(0.6);

        queue.try_push(100 * MS);
        assert_eq!(sampler.on_frame(0.1, 104 * MS, &queue), FrameOutcome::Ignored);
        assert_eq!(sampler.on_frame(0.9, 112 * MS, &queue), FrameOutcome::Detected);

        let outcome = sampler.on_frame(0.9, 116 * MS, &queue);
        let FrameOutcome::Paired(sample) = outcome else {
            panic!("expected pair, got {outcome:?}");
        };
        assert_eq!(sample.flash_timestamp_nanos, 100 * MS);
        assert_eq!(sample.camera_timestamp_nanos, 116 * MS);
        assert!((sample.brightness - 0.9).abs() < 1e-6);
        assert_eq!(sampler.sample_count(), 1);
    }

    #[test]
    fn test_hysteresis_prevents_double_count() {
        let queue = FlashQueue::new(4);
        let mut sampler = CalibrationSampler::new(0.6);
        queue.try_push(0);
        queue.try_push(MS);

        sampler.on_frame(0.9, 10 * MS, &queue);
        sampler.on_frame(0.9, 14 * MS, &queue);
        // Dips to 0.4: not below 0.3, still lit
        sampler.on_frame(0.4, 18 * MS, &queue);
        assert_eq!(sampler.on_frame(0.9, 22 * MS, &queue), FrameOutcome::Ignored);
        assert_eq!(sampler.sample_count(), 1);
        assert_eq!(queue.len(), 1);

        // Dark frame clears the in-flight flag, next flash detected
        sampler.on_frame(0.05, 26 * MS, &queue);
        assert_eq!(sampler.on_frame(0.9, 30 * MS, &queue), FrameOutcome::Detected);
    }

    #[test]
    fn test_dark_completing_frame_clears_in_flight() {
        let queue = FlashQueue::new(4);
        let mut sampler = CalibrationSampler::new(0.6);
        queue.try_push(0);
        queue.try_push(20 * MS);

        assert_eq!(sampler.on_frame(0.9, 10 * MS, &queue), FrameOutcome::Detected);
        // Short flash: the pairing frame is already dark
        assert!(matches!(
            sampler.on_frame(0.05, 14 * MS, &queue),
            FrameOutcome::Paired(_)
        ));
        // Very next frame is the following flash
        assert_eq!(sampler.on_frame(0.9, 28 * MS, &queue), FrameOutcome::Detected);
        assert!(matches!(
            sampler.on_frame(0.9, 32 * MS, &queue),
            FrameOutcome::Paired(_)
        ));
        assert_eq!(sampler.sample_count(), 2);
    }

    #[test]
    fn test_edge_without_flash_is_unmatched() {
        let queue = FlashQueue::new(4);
        let mut sampler = CalibrationSampler::new(0.5);
        assert_eq!(sampler.on_frame(0.8, MS, &queue), FrameOutcome::Unmatched);
        assert_eq!(sampler.unmatched(), 1);
        assert_eq!(sampler.sample_count(), 0);
    }

    #[test]
    fn test_camera_before_flash_is_discarded() {
        let queue = FlashQueue::new(4);
        let mut sampler = CalibrationSampler::new(0.5);
        queue.try_push(50 * MS);
        sampler.on_frame(0.9, 40 * MS, &queue);
        assert_eq!(sampler.on_frame(0.9, 45 * MS, &queue), FrameOutcome::Discarded);
        assert_eq!(sampler.discarded(), 1);
        assert!(sampler.samples().is_empty());
    }

    #[test]
    fn test_take_and_reset() {
        let queue = FlashQueue::new(4);
        let mut sampler = CalibrationSampler::new(0.5);
        queue.try_push(0);
        sampler.on_frame(0.9, MS, &queue);
        sampler.on_frame(0.9, 2 * MS, &queue);

        assert_eq!(sampler.take_samples().len(), 1);
        assert_eq!(sampler.sample_count(), 0);

        sampler.reset(0.7);
        assert_eq!(sampler.threshold(), 0.7);
        assert_eq!(sampler.unmatched(), 0);
    }
}
