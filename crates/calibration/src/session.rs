//! Calibration run controller.
//!
//! Owns the run state machine `Idle -> Initializing -> Recording -> Analyzing ->
//! Completed | Error` and a dedicated worker thread per run. Frames and flash
//! timestamps arrive from collaborator threads; they only touch the flash queue
//! and the sampler, never the worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{
    CalibrationParams, CalibrationResult, CalibrationSettings, CalibrationState, CameraFrame,
    FrameCallback, FrameSource,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::analyzer::analyze;
use crate::brightness::luma_brightness;
use crate::error::{CalibrationError, Result};
use crate::queue::FlashQueue;
use crate::sampler::CalibrationSampler;

/// Progress update period while recording
const PROGRESS_TICK: Duration = Duration::from_millis(20);

/// Poll period of the bounded join
const JOIN_POLL: Duration = Duration::from_millis(5);

/// State shared between the session handle, the worker and frame callbacks
struct Shared {
    state: RwLock<CalibrationState>,
    last_result: Mutex<Option<CalibrationResult>>,
    last_error: Mutex<Option<CalibrationError>>,
    flashes: FlashQueue,
    sampler: Mutex<CalibrationSampler>,
    /// Inputs are only accepted while set
    recording: AtomicBool,
    cancel: AtomicBool,
}

impl Shared {
    fn set_state(&self, state: CalibrationState) {
        *self.state.write() = state;
    }

    fn observe(&self, brightness: f32, timestamp_nanos: i64) {
        if !self.recording.load(Ordering::Acquire) {
            return;
        }
        self.sampler
            .lock()
            .on_frame(brightness, timestamp_nanos, &self.flashes);
    }

    fn fail(&self, err: CalibrationError) {
        warn!(error = %err, "calibration failed");
        metrics::counter!("truetime_calibration_runs_total", "outcome" => "error").increment(1);
        self.set_state(CalibrationState::Error {
            message: err.to_string(),
        });
        *self.last_error.lock() = Some(err);
    }
}

/// Calibration session
///
/// One run at a time. Dropping the session cancels a running worker without
/// waiting for it.
pub struct CalibrationSession {
    shared: Arc<Shared>,
    settings: CalibrationSettings,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for CalibrationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalibrationSession")
            .field("state", &*self.shared.state.read())
            .field("settings", &self.settings)
            .finish()
    }
}

impl CalibrationSession {
    /// Create an idle session
    pub fn new(settings: CalibrationSettings) -> Self {
        let shared = Shared {
            state: RwLock::new(CalibrationState::Idle),
            last_result: Mutex::new(None),
            last_error: Mutex::new(None),
            flashes: FlashQueue::new(settings.flash_queue_capacity),
            sampler: Mutex::new(CalibrationSampler::new(
                CalibrationParams::default().brightness_threshold,
            )),
            recording: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
        };
        Self {
            shared: Arc::new(shared),
            settings,
            worker: Mutex::new(None),
        }
    }

    /// Record a flash emission
    ///
    /// Must be called before the flash becomes visible. Never blocks; the
    /// timestamp is dropped if the queue is full or no run is recording.
    pub fn on_flash_emitted(&self, timestamp_nanos: i64) {
        if self.shared.recording.load(Ordering::Acquire) {
            self.shared.flashes.try_push(timestamp_nanos);
        }
    }

    /// Feed one camera observation, already reduced to a brightness scalar
    pub fn on_camera_frame(&self, brightness: f32, capture_timestamp_nanos: i64) {
        self.shared.observe(brightness, capture_timestamp_nanos);
    }

    /// Feed one raw camera frame
    pub fn on_frame(&self, frame: &CameraFrame) {
        if self.shared.recording.load(Ordering::Acquire) {
            self.shared
                .observe(luma_brightness(frame), frame.timestamp_nanos);
        }
    }

    /// Start a run capturing from `source`
    ///
    /// # Errors
    /// `AlreadyRunning` if a run is active. Capture failures are reported
    /// through the `Error` state, not here.
    #[instrument(name = "calibration_start", skip(self, source), fields(fps = source.frame_rate_hz()))]
    pub fn start_calibration(
        &self,
        params: CalibrationParams,
        source: Arc<dyn FrameSource>,
    ) -> Result<()> {
        let mut worker = self.worker.lock();

        if let Some(handle) = worker.take() {
            if !handle.is_finished() {
                *worker = Some(handle);
                return Err(CalibrationError::AlreadyRunning);
            }
            if handle.join().is_err() {
                error!("previous calibration worker panicked");
            }
        }
        if self.shared.state.read().is_active() {
            return Err(CalibrationError::AlreadyRunning);
        }

        let run_secs = self
            .settings
            .run_duration_override_s
            .unwrap_or(params.run_duration_secs);
        let run_duration = Duration::try_from_secs_f64(run_secs).unwrap_or(Duration::ZERO);
        let min_samples = self.settings.min_samples;

        self.shared.cancel.store(false, Ordering::SeqCst);
        self.shared.flashes.clear();
        self.shared.sampler.lock().reset(params.brightness_threshold);
        *self.shared.last_error.lock() = None;
        self.shared.set_state(CalibrationState::Initializing);

        info!(
            run_secs,
            flash_period_ms = params.flash_period_ms,
            threshold = params.brightness_threshold,
            "calibration starting"
        );

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("calibration-worker".to_string())
            .spawn(move || run_worker(shared, params, source, run_duration, min_samples));

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                let err = CalibrationError::Capture {
                    message: format!("failed to spawn calibration worker: {e}"),
                };
                self.shared.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Cancel the current run and wait (bounded) for the worker
    ///
    /// A run still recording returns to `Idle` without a result; an analysis
    /// already in progress completes first. Returns the state after the wait.
    #[instrument(name = "calibration_stop", skip(self))]
    pub fn stop_calibration(&self) -> CalibrationState {
        self.shared.cancel.store(true, Ordering::SeqCst);

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let deadline = Instant::now() + self.settings.stop_timeout();
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(JOIN_POLL);
            }

            if handle.is_finished() {
                if handle.join().is_err() {
                    self.shared.recording.store(false, Ordering::SeqCst);
                    self.shared.fail(CalibrationError::Capture {
                        message: "calibration worker panicked".to_string(),
                    });
                }
            } else {
                warn!(
                    timeout_ms = self.settings.stop_timeout_ms,
                    "calibration worker did not stop in time, detaching"
                );
            }
        }

        self.state()
    }

    /// Block until the current run leaves the active states or `timeout` passes
    pub fn wait_for_completion(&self, timeout: Duration) -> CalibrationState {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.state();
            if !state.is_active() || Instant::now() >= deadline {
                return state;
            }
            thread::sleep(PROGRESS_TICK);
        }
    }

    /// Current state
    pub fn state(&self) -> CalibrationState {
        self.shared.state.read().clone()
    }

    /// Whether a run is active
    pub fn is_active(&self) -> bool {
        self.shared.state.read().is_active()
    }

    /// Result of the most recent completed run
    pub fn last_result(&self) -> Option<CalibrationResult> {
        *self.shared.last_result.lock()
    }

    /// Error of the most recent failed run
    pub fn last_error(&self) -> Option<CalibrationError> {
        self.shared.last_error.lock().clone()
    }

    /// Flash timestamps dropped because the queue was full
    pub fn dropped_flashes(&self) -> u64 {
        self.shared.flashes.dropped()
    }

    /// Session configuration
    pub fn settings(&self) -> &CalibrationSettings {
        &self.settings
    }
}

impl Drop for CalibrationSession {
    fn drop(&mut self) {
        self.shared.cancel.store(true, Ordering::SeqCst);
    }
}

fn run_worker(
    shared: Arc<Shared>,
    params: CalibrationParams,
    source: Arc<dyn FrameSource>,
    run_duration: Duration,
    min_samples: usize,
) {
    let frame_shared = Arc::clone(&shared);
    let on_frame: FrameCallback = Arc::new(move |frame: CameraFrame| {
        if frame_shared.recording.load(Ordering::Acquire) {
            frame_shared.observe(luma_brightness(&frame), frame.timestamp_nanos);
        }
    });

    if let Err(e) = source.start_capture(on_frame) {
        shared.fail(CalibrationError::Capture {
            message: e.to_string(),
        });
        return;
    }

    shared.recording.store(true, Ordering::SeqCst);
    shared.set_state(CalibrationState::Recording {
        progress: 0.0,
        sample_count: 0,
    });
    debug!("calibration recording");

    let started = Instant::now();
    let cancelled = loop {
        if shared.cancel.load(Ordering::SeqCst) {
            break true;
        }
        let elapsed = started.elapsed();
        if elapsed >= run_duration {
            break false;
        }
        let progress = (elapsed.as_secs_f64() / run_duration.as_secs_f64()) as f32;
        let sample_count = shared.sampler.lock().sample_count();
        shared.set_state(CalibrationState::Recording {
            progress,
            sample_count,
        });
        thread::sleep(PROGRESS_TICK.min(run_duration - elapsed));
    };

    shared.recording.store(false, Ordering::SeqCst);
    source.stop();

    let samples = {
        let mut sampler = shared.sampler.lock();
        debug!(
            samples = sampler.sample_count(),
            unmatched = sampler.unmatched(),
            discarded = sampler.discarded(),
            dropped_flashes = shared.flashes.dropped(),
            "recording finished"
        );
        sampler.take_samples()
    };
    shared.flashes.clear();

    if cancelled {
        info!("calibration cancelled");
        metrics::counter!("truetime_calibration_runs_total", "outcome" => "cancelled")
            .increment(1);
        shared.set_state(CalibrationState::Idle);
        return;
    }

    shared.set_state(CalibrationState::Analyzing { progress: 0.0 });

    let outcome = if samples.len() < min_samples {
        Err(CalibrationError::InsufficientSamples {
            collected: samples.len(),
            required: min_samples,
        })
    } else {
        analyze(&samples, params.outlier_sigma)
    };

    match outcome {
        Ok(result) => {
            info!(
                median_ms = result.median_delay_ms,
                precision_ms = result.estimated_precision_ms,
                samples = result.sample_count,
                outliers = result.outlier_count,
                "calibration completed"
            );
            metrics::counter!("truetime_calibration_runs_total", "outcome" => "completed")
                .increment(1);
            *shared.last_result.lock() = Some(result);
            shared.set_state(CalibrationState::Completed { result });
        }
        Err(err) => shared.fail(err),
    }
}
