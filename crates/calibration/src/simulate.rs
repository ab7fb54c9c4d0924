//! Synthetic flash / display / camera rig
//!
//! Drives a full calibration without hardware: a `FlashScheduler` toggles a
//! `SimulatedDisplay`, and a `SimulatedCamera` renders what that display
//! showed `display_latency` (plus jitter) ago. All timestamps come from one
//! `MonotonicSource`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use contracts::{
    CalibrationParams, CameraFrame, ContractError, DisplayInfo, FrameCallback, FrameSource,
};
use parking_lot::Mutex;
use rand::Rng;
use sync_engine::MonotonicSource;
use tracing::{debug, trace};

/// Luma value of a frame showing a lit flash
pub const LIT_LEVEL: u8 = 235;

/// Luma value of a dark frame
pub const DARK_LEVEL: u8 = 16;

/// Flash intervals remembered by the display
const DISPLAY_HISTORY: usize = 64;

/// Slice used when sleeping so `stop` is honoured promptly
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Flash emission callback, called before the flash becomes visible
pub type FlashCallback = Arc<dyn Fn(i64) + Send + Sync>;

fn sleep_while(running: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while running.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

/// Display that records when it was lit
#[derive(Debug)]
pub struct SimulatedDisplay {
    refresh_rate_hz: f64,
    /// `(on, off)` monotonic timestamps; `off` is `None` while lit
    lit: Mutex<VecDeque<(i64, Option<i64>)>>,
}

impl SimulatedDisplay {
    /// Create a dark display
    pub fn new(refresh_rate_hz: f64) -> Self {
        Self {
            refresh_rate_hz,
            lit: Mutex::new(VecDeque::with_capacity(DISPLAY_HISTORY)),
        }
    }

    /// Light the flash at `timestamp_nanos`
    pub fn flash_on(&self, timestamp_nanos: i64) {
        let mut lit = self.lit.lock();
        if lit.len() == DISPLAY_HISTORY {
            lit.pop_front();
        }
        lit.push_back((timestamp_nanos, None));
    }

    /// Turn the flash off at `timestamp_nanos`
    pub fn flash_off(&self, timestamp_nanos: i64) {
        if let Some(last) = self.lit.lock().back_mut() {
            if last.1.is_none() {
                last.1 = Some(timestamp_nanos);
            }
        }
    }

    /// Whether the flash was lit at `timestamp_nanos`
    pub fn is_lit_at(&self, timestamp_nanos: i64) -> bool {
        self.lit.lock().iter().any(|&(on, off)| {
            on <= timestamp_nanos && off.map_or(true, |off| timestamp_nanos < off)
        })
    }
}

impl DisplayInfo for SimulatedDisplay {
    fn refresh_rate_hz(&self) -> f64 {
        self.refresh_rate_hz
    }
}

/// Periodic flash driver
///
/// Reports each emission through the callback, then lights the display for
/// `flash_duration_ms`, once every `flash_period_ms`.
pub struct FlashScheduler {
    running: Arc<AtomicBool>,
    emitted: Arc<AtomicU64>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FlashScheduler {
    /// Start flashing
    pub fn start(
        params: &CalibrationParams,
        monotonic: Arc<dyn MonotonicSource>,
        display: Arc<SimulatedDisplay>,
        on_emit: FlashCallback,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let emitted = Arc::new(AtomicU64::new(0));
        let on_for = Duration::from_millis(params.flash_duration_ms);
        let off_for = Duration::from_millis(
            params
                .flash_period_ms
                .saturating_sub(params.flash_duration_ms),
        );

        let thread_running = Arc::clone(&running);
        let thread_emitted = Arc::clone(&emitted);
        let handle = thread::spawn(move || {
            debug!(
                on_ms = on_for.as_millis() as u64,
                off_ms = off_for.as_millis() as u64,
                "flash scheduler started"
            );
            while thread_running.load(Ordering::Relaxed) {
                let ts = monotonic.now_nanos();
                on_emit(ts);
                display.flash_on(ts);
                thread_emitted.fetch_add(1, Ordering::Relaxed);
                trace!(ts, "flash on");

                sleep_while(&thread_running, on_for);
                display.flash_off(monotonic.now_nanos());
                sleep_while(&thread_running, off_for);
            }
            debug!("flash scheduler stopped");
        });

        Self {
            running,
            emitted,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Stop flashing and join the thread
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    /// Flashes emitted so far
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

impl Drop for FlashScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Simulated camera configuration
#[derive(Debug, Clone)]
pub struct SimulatedCameraConfig {
    /// Frames per second
    pub fps: f64,
    /// Delay between a flash and the display showing it
    pub display_latency: Duration,
    /// Uniform jitter (±) added to the display latency per frame
    pub jitter: Duration,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Refuse to start, as a camera without permission would
    pub fail_start: bool,
}

impl Default for SimulatedCameraConfig {
    fn default() -> Self {
        Self {
            fps: 240.0,
            display_latency: Duration::from_millis(30),
            jitter: Duration::from_micros(500),
            width: 64,
            height: 48,
            fail_start: false,
        }
    }
}

/// Camera filming a [`SimulatedDisplay`]
pub struct SimulatedCamera {
    config: SimulatedCameraConfig,
    display: Arc<SimulatedDisplay>,
    monotonic: Arc<dyn MonotonicSource>,
    capturing: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedCamera {
    /// Create a stopped camera
    pub fn new(
        config: SimulatedCameraConfig,
        display: Arc<SimulatedDisplay>,
        monotonic: Arc<dyn MonotonicSource>,
    ) -> Self {
        Self {
            config,
            display,
            monotonic,
            capturing: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }
}

impl FrameSource for SimulatedCamera {
    fn frame_rate_hz(&self) -> f64 {
        self.config.fps
    }

    fn start_capture(&self, on_frame: FrameCallback) -> Result<(), ContractError> {
        if self.config.fail_start {
            return Err(ContractError::capture("simulated camera refused to start"));
        }
        if !(self.config.fps.is_finite() && self.config.fps > 0.0) {
            return Err(ContractError::capture(format!(
                "invalid frame rate {}",
                self.config.fps
            )));
        }
        // Idempotent: if already capturing, don't start again
        if self.capturing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let config = self.config.clone();
        let display = Arc::clone(&self.display);
        let monotonic = Arc::clone(&self.monotonic);
        let capturing = Arc::clone(&self.capturing);

        let interval = Duration::from_secs_f64(1.0 / config.fps);
        let latency = config.display_latency.as_nanos() as i64;
        let jitter = config.jitter.as_nanos() as i64;
        let plane_len = (config.width * config.height) as usize;

        let handle = thread::spawn(move || {
            let mut rng = rand::rng();
            let mut frames: u64 = 0;
            debug!(fps = config.fps, latency_ns = latency, "simulated camera started");

            while capturing.load(Ordering::Relaxed) {
                let ts = monotonic.now_nanos();
                let delay = latency + rng.random_range(-jitter..=jitter);
                let level = if display.is_lit_at(ts - delay) {
                    LIT_LEVEL
                } else {
                    DARK_LEVEL
                };

                on_frame(CameraFrame {
                    timestamp_nanos: ts,
                    width: config.width,
                    height: config.height,
                    row_stride: config.width as usize,
                    luma: Bytes::from(vec![level; plane_len]),
                });
                frames += 1;

                thread::sleep(interval);
            }

            debug!(frames, "simulated camera stopped");
        });

        *self.handle.lock() = Some(handle);
        Ok(())
    }

    fn stop(&self) {
        self.capturing.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Relaxed)
    }
}

impl Drop for SimulatedCamera {
    fn drop(&mut self) {
        self.stop();
    }
}
