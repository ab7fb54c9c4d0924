//! FrameSource trait - camera capture abstraction
//!
//! Hides the platform camera session behind `start_capture` / `stop`, so the
//! calibration algorithm can be driven by real cameras or synthetic frames.

use std::sync::Arc;

use bytes::Bytes;

use crate::ContractError;

/// A captured camera frame, reduced to its luma plane
#[derive(Debug, Clone)]
pub struct CameraFrame {
    /// Monotonic capture timestamp, same clock domain as flash timestamps
    pub timestamp_nanos: i64,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Bytes per luma row (may exceed `width` because of padding)
    pub row_stride: usize,

    /// Luma (Y) plane, zero-copy
    pub luma: Bytes,
}

/// Frame callback type
///
/// Invoked on the capture thread for every delivered frame.
pub type FrameCallback = Arc<dyn Fn(CameraFrame) + Send + Sync>;

/// Camera capture capability
///
/// # Example
///
/// ```ignore
/// let source: Arc<dyn FrameSource> = platform_camera();
/// source.start_capture(Arc::new(|frame| {
///     println!("frame at {}", frame.timestamp_nanos);
/// }))?;
/// // ... calibrate ...
/// source.stop();
/// ```
pub trait FrameSource: Send + Sync {
    /// Measured frame rate of the capture pipeline
    fn frame_rate_hz(&self) -> f64;

    /// Start delivering frames to `on_frame`
    ///
    /// Fails with `ContractError::Capture` when the camera cannot be opened.
    /// Calling it while already capturing is a no-op.
    fn start_capture(&self, on_frame: FrameCallback) -> Result<(), ContractError>;

    /// Stop delivering frames; idempotent
    fn stop(&self);

    /// Check if currently capturing
    fn is_capturing(&self) -> bool;
}
