//! # Calibration
//!
//! Display latency measurement by flash correlation.
//!
//! Responsibilities:
//! - Bounded, non-blocking flash timestamp hand-off (`FlashQueue`)
//! - Frame brightness reduction and rising-edge pairing (`CalibrationSampler`)
//! - Median / MAD outlier rejection (`analyze`)
//! - Run state machine on a dedicated worker thread (`CalibrationSession`)
//! - Synthetic flash / display / camera rig for hardware-free runs
//!
//! ## Usage Example
//!
//! ```ignore
//! use calibration::CalibrationSession;
//! use contracts::{CalibrationParams, CalibrationSettings};
//!
//! let session = CalibrationSession::new(CalibrationSettings::default());
//! session.start_calibration(CalibrationParams::for_fps(camera.frame_rate_hz()), camera)?;
//!
//! // flash UI thread
//! session.on_flash_emitted(clock.now_nanos());
//!
//! if let CalibrationState::Completed { result } = session.wait_for_completion(timeout) {
//!     store.accept(&result)?;
//! }
//! ```

mod analyzer;
mod brightness;
mod error;
mod queue;
mod sampler;
mod session;
pub mod simulate;

// Re-exports
pub use analyzer::{analyze, MAD_SCALE};
pub use brightness::{luma_brightness, strided_mean, DEFAULT_SAMPLE_STRIDE};
pub use contracts::{CalibrationParams, CalibrationResult, CalibrationSample, CalibrationState};
pub use error::{CalibrationError, Result};
pub use queue::FlashQueue;
pub use sampler::{CalibrationSampler, FrameOutcome};
pub use session::CalibrationSession;
pub use simulate::{FlashScheduler, SimulatedCamera, SimulatedCameraConfig, SimulatedDisplay};
