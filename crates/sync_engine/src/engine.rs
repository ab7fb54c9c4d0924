//! Main sync engine implementation.
//!
//! Burst-of-N SNTP exchange that keeps the lowest-RTT sample and commits its
//! offset into the shared [`OffsetRegister`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use contracts::{
    SntpTransport, SyncResult, SyncSample, SyncSettings, TransportFactory, NANOS_PER_MILLI,
};
use parking_lot::{Mutex, RwLock};
use ringbuf::{traits::*, HeapRb};
use tracing::{debug, info, instrument, warn};

use crate::clock::PreciseClock;
use crate::error::{AttemptError, SyncError};
use crate::monotonic::MonotonicSource;
use crate::packet::{build_request, parse_transmit_timestamp};
use crate::register::OffsetRegister;

/// Number of past results kept for diagnostics
pub const HISTORY_CAPACITY: usize = 32;

/// Receive buffer; larger than a packet so oversized replies are detected
const RECV_BUF_LEN: usize = 64;

/// Sync engine configuration
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    /// Attempts per burst
    pub burst_size: u32,
    /// Receive timeout per attempt
    pub timeout: Duration,
    /// Pause between attempts
    pub sample_pause: Duration,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            burst_size: 5,
            timeout: Duration::from_secs(3),
            sample_pause: Duration::from_millis(50),
        }
    }
}

impl From<&SyncSettings> for SyncEngineConfig {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            burst_size: settings.burst_size,
            timeout: settings.timeout(),
            sample_pause: settings.sample_pause(),
        }
    }
}

/// Resets the in-flight flag when a sync call ends, however it ends
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// SNTP synchronisation engine
///
/// Owns the committed offset register exclusively. Cheap to share behind an
/// `Arc`; `sync` calls are serialised by an in-flight flag.
pub struct SyncEngine {
    /// Configuration
    config: SyncEngineConfig,
    /// Transport factory (UDP in production)
    transports: Arc<dyn TransportFactory>,
    /// Local monotonic clock
    monotonic: Arc<dyn MonotonicSource>,
    /// Committed offset, read lock-free by `PreciseClock`
    register: Arc<OffsetRegister>,
    /// Most recent committed result
    last_result: RwLock<Option<SyncResult>>,
    /// Recent committed results
    history: Mutex<HeapRb<SyncResult>>,
    /// Set while a burst is running
    in_flight: AtomicBool,
    /// Serialises multi-server syncs
    serial: Mutex<()>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("offset_nanos", &self.register.load())
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish()
    }
}

impl SyncEngine {
    /// Create a new sync engine
    pub fn new(
        config: SyncEngineConfig,
        transports: Arc<dyn TransportFactory>,
        monotonic: Arc<dyn MonotonicSource>,
    ) -> Self {
        Self {
            config,
            transports,
            monotonic,
            register: Arc::new(OffsetRegister::new()),
            last_result: RwLock::new(None),
            history: Mutex::new(HeapRb::new(HISTORY_CAPACITY)),
            in_flight: AtomicBool::new(false),
            serial: Mutex::new(()),
        }
    }

    /// Run one burst against `server` and commit the best sample
    ///
    /// On failure the previously committed offset is left untouched.
    #[instrument(name = "sync_engine_sync", skip(self), fields(burst = self.config.burst_size))]
    pub fn sync(&self, server: &str) -> Result<SyncResult, SyncError> {
        let _guard = InFlightGuard::acquire(&self.in_flight).ok_or(SyncError::InFlight)?;

        let mut transport = self
            .transports
            .open(server, self.config.timeout)
            .map_err(|source| {
                metrics::counter!("truetime_sync_failures_total", "reason" => "transport")
                    .increment(1);
                SyncError::Transport {
                    server: server.to_string(),
                    source,
                }
            })?;

        let mut best: Option<SyncSample> = None;
        let mut successes = 0u32;
        let mut last_error: Option<AttemptError> = None;

        for attempt in 0..self.config.burst_size {
            if attempt > 0 && !self.config.sample_pause.is_zero() {
                thread::sleep(self.config.sample_pause);
            }

            match self.exchange(transport.as_mut()) {
                Ok(sample) => {
                    successes += 1;
                    metrics::counter!("truetime_sync_attempts_total", "outcome" => "ok")
                        .increment(1);
                    debug!(
                        attempt,
                        rtt_us = sample.rtt_nanos / 1_000,
                        offset_us = sample.offset_nanos / 1_000,
                        "sync sample"
                    );
                    // Strict `<`: the first sample reaching the minimum RTT wins
                    if best.map_or(true, |b| sample.rtt_nanos < b.rtt_nanos) {
                        best = Some(sample);
                    }
                }
                Err(err) => {
                    metrics::counter!("truetime_sync_attempts_total", "outcome" => "error")
                        .increment(1);
                    debug!(attempt, error = %err, "sync attempt skipped");
                    last_error = Some(err);
                }
            }
        }

        let Some(best) = best else {
            metrics::counter!("truetime_sync_failures_total", "reason" => "all_attempts")
                .increment(1);
            let last_error = last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".to_string());
            warn!(server = %server, error = %last_error, "sync failed, keeping previous offset");
            return Err(SyncError::AllAttemptsFailed {
                server: server.to_string(),
                attempts: self.config.burst_size,
                last_error,
            });
        };

        let result = SyncResult {
            offset_nanos: best.offset_nanos,
            rtt_nanos: best.rtt_nanos,
            server: server.to_string(),
            wall_clock_epoch_millis: (best.t4_nanos + best.offset_nanos)
                .div_euclid(NANOS_PER_MILLI),
            samples_used: successes,
        };
        self.commit(&result);

        info!(
            server = %server,
            offset_ms = format!("{:.3}", result.offset_ms()),
            rtt_ms = format!("{:.3}", result.rtt_ms()),
            samples = successes,
            "sync committed"
        );

        Ok(result)
    }

    /// Try `servers` in order and return the first successful burst
    ///
    /// Waits for a multi-server sync already running on another thread, then
    /// runs its own.
    #[instrument(name = "sync_engine_sync_any", skip(self))]
    pub fn sync_any(&self, servers: &[String]) -> Result<SyncResult, SyncError> {
        let _serial = self.serial.lock();
        self.sync_servers(servers)
    }

    /// Like [`sync_any`](Self::sync_any) but returns `InFlight` instead of waiting
    #[instrument(name = "sync_engine_try_sync_any", skip(self))]
    pub fn try_sync_any(&self, servers: &[String]) -> Result<SyncResult, SyncError> {
        let _serial = self.serial.try_lock().ok_or(SyncError::InFlight)?;
        self.sync_servers(servers)
    }

    fn sync_servers(&self, servers: &[String]) -> Result<SyncResult, SyncError> {
        let mut last_err = SyncError::NoServers;
        for server in servers {
            match self.sync(server) {
                Ok(result) => return Ok(result),
                Err(SyncError::InFlight) => return Err(SyncError::InFlight),
                Err(err) => {
                    debug!(server = %server, error = %err, "server failed, trying next");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    /// One request/response exchange
    fn exchange(&self, transport: &mut dyn SntpTransport) -> Result<SyncSample, AttemptError> {
        let request = build_request();
        let mut buf = [0u8; RECV_BUF_LEN];

        // A late reply to an earlier attempt must not be read as this one's
        transport.discard_pending().map_err(AttemptError::from_io)?;

        let t1 = self.monotonic.now_nanos();
        transport.send(&request).map_err(AttemptError::from_io)?;
        let len = transport.recv(&mut buf).map_err(AttemptError::from_io)?;
        let t4 = self.monotonic.now_nanos();

        let t3 = parse_transmit_timestamp(&buf[..len])?;
        Ok(SyncSample::from_timestamps(t1, t3, t4))
    }

    /// Publish a result: offset first, then the result record
    fn commit(&self, result: &SyncResult) {
        self.register.store(result.offset_nanos);
        *self.last_result.write() = Some(result.clone());

        let mut history = self.history.lock();
        if history.is_full() {
            let _ = history.try_pop();
        }
        let _ = history.try_push(result.clone());

        metrics::gauge!("truetime_sync_offset_ms").set(result.offset_ms());
        metrics::histogram!("truetime_sync_rtt_ms").record(result.rtt_ms());
    }

    /// Most recent committed result
    pub fn last_result(&self) -> Option<SyncResult> {
        self.last_result.read().clone()
    }

    /// Recent committed results, oldest first
    pub fn history(&self) -> Vec<SyncResult> {
        self.history.lock().iter().cloned().collect()
    }

    /// Whether a burst is currently running
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Shared offset register
    pub fn register(&self) -> Arc<OffsetRegister> {
        Arc::clone(&self.register)
    }

    /// Local monotonic clock used for T1/T4
    pub fn monotonic(&self) -> Arc<dyn MonotonicSource> {
        Arc::clone(&self.monotonic)
    }

    /// Fast read-path clock backed by this engine's register
    pub fn clock(&self) -> PreciseClock {
        PreciseClock::new(self.monotonic(), self.register())
    }

    /// Engine configuration
    pub fn config(&self) -> &SyncEngineConfig {
        &self.config
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{ScriptedFactory, Step};
    use super::*;
    use crate::monotonic::ManualClock;

    const SECOND: i64 = 1_000_000_000;

    fn engine_with(steps: Vec<Step>) -> (SyncEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(5 * SECOND));
        let factory = ScriptedFactory::new(Arc::clone(&clock), steps);
        let config = SyncEngineConfig {
            sample_pause: Duration::ZERO,
            ..Default::default()
        };
        let engine = SyncEngine::new(config, Arc::new(factory), clock.clone());
        (engine, clock)
    }

    fn reply(rtt_ms: i64, offset_nanos: i64) -> Step {
        Step::Reply {
            rtt_ms,
            offset_nanos,
        }
    }

    #[test]
    fn test_burst_keeps_first_minimum_rtt() {
        let base = 1_700_000_000 * SECOND;
        let (engine, _) = engine_with(vec![
            reply(12, base + 1),
            reply(3, base + 2_000),
            reply(30, base + 3_000),
            reply(3, base + 4_000),
            reply(9, base + 5_000),
        ]);

        let result = engine.sync("scripted").unwrap();
        assert_eq!(result.rtt_nanos, 3 * NANOS_PER_MILLI);
        assert!((result.offset_nanos - (base + 2_000)).abs() <= 1);
        assert_eq!(result.samples_used, 5);
        assert_eq!(result.server, "scripted");
        assert_eq!(engine.register().load(), Some(result.offset_nanos));
    }

    #[test]
    fn test_all_attempts_failed_keeps_previous_offset() {
        let (engine, _) = engine_with(vec![reply(5, 42 * SECOND)]);
        let first = engine.sync("scripted").unwrap();
        // Remaining attempts of the first burst timed out; script is now empty
        assert_eq!(first.samples_used, 1);

        let err = engine.sync("scripted").unwrap_err();
        assert!(matches!(
            err,
            SyncError::AllAttemptsFailed { attempts: 5, .. }
        ));
        assert_eq!(engine.register().load(), Some(first.offset_nanos));
        assert_eq!(engine.last_result(), Some(first));
    }

    #[test]
    fn test_failures_are_skipped() {
        let (engine, _) = engine_with(vec![
            Step::Timeout,
            Step::Truncated,
            reply(8, 7 * SECOND),
            Step::Timeout,
            reply(20, 9 * SECOND),
        ]);
        let result = engine.sync("scripted").unwrap();
        assert_eq!(result.samples_used, 2);
        assert!((result.offset_nanos - 7 * SECOND).abs() <= 1);
    }

    #[test]
    fn test_transport_open_failure() {
        let clock = Arc::new(ManualClock::new(0));
        let mut factory = ScriptedFactory::new(Arc::clone(&clock), vec![]);
        factory.fail_open = true;
        let engine = SyncEngine::new(SyncEngineConfig::default(), Arc::new(factory), clock);

        let err = engine.sync("nowhere.invalid").unwrap_err();
        assert!(matches!(err, SyncError::Transport { .. }));
        assert!(!engine.register().is_synced());
        assert!(!engine.is_in_flight());
    }

    #[test]
    fn test_unsynced_before_first_burst() {
        let (engine, _) = engine_with(vec![]);
        assert!(engine.last_result().is_none());
        assert!(engine.clock().now().is_err());
    }

    #[test]
    fn test_wall_clock_timestamp_matches_true_time() {
        let base = 1_700_000_000 * SECOND;
        let (engine, _) = engine_with(vec![reply(10, base)]);
        let result = engine.sync("scripted").unwrap();
        // t4 = 5s + 10ms on the local clock, true time = t4 + base
        let expected_ms = (base + 5 * SECOND + 10 * NANOS_PER_MILLI) / NANOS_PER_MILLI;
        assert!((result.wall_clock_epoch_millis - expected_ms).abs() <= 1);
    }

    #[test]
    fn test_sync_any_falls_through_servers() {
        let clock = Arc::new(ManualClock::new(SECOND));
        let factory = ScriptedFactory::new(Arc::clone(&clock), vec![]);
        // First server: five timeouts; second server answers
        factory.push([Step::Timeout; 5]);
        factory.push([reply(4, 3 * SECOND)]);
        let opens = Arc::clone(&factory.opens);
        let config = SyncEngineConfig {
            sample_pause: Duration::ZERO,
            ..Default::default()
        };
        let engine = SyncEngine::new(config, Arc::new(factory), clock);

        let servers = vec!["a.example".to_string(), "b.example".to_string()];
        let result = engine.sync_any(&servers).unwrap();
        assert_eq!(result.server, "b.example");
        assert_eq!(*opens.lock(), 2);
    }

    #[test]
    fn test_sync_any_without_servers() {
        let (engine, _) = engine_with(vec![]);
        assert!(matches!(engine.sync_any(&[]), Err(SyncError::NoServers)));
    }

    /// Answers after a real wall-clock delay so bursts overlap in time
    struct SlowFactory {
        clock: Arc<ManualClock>,
        delay: Duration,
    }

    struct SlowTransport {
        clock: Arc<ManualClock>,
        delay: Duration,
    }

    impl TransportFactory for SlowFactory {
        fn open(
            &self,
            _server: &str,
            _timeout: Duration,
        ) -> std::io::Result<Box<dyn SntpTransport>> {
            Ok(Box::new(SlowTransport {
                clock: Arc::clone(&self.clock),
                delay: self.delay,
            }))
        }
    }

    impl SntpTransport for SlowTransport {
        fn send(&mut self, _request: &[u8]) -> std::io::Result<()> {
            Ok(())
        }

        fn recv(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            thread::sleep(self.delay);
            let response = crate::packet::build_response(self.clock.now_nanos() + SECOND);
            buf[..response.len()].copy_from_slice(&response);
            Ok(response.len())
        }
    }

    #[test]
    fn test_sync_any_waits_for_running_sync() {
        let clock = Arc::new(ManualClock::new(SECOND));
        let config = SyncEngineConfig {
            burst_size: 2,
            sample_pause: Duration::ZERO,
            ..Default::default()
        };
        let factory = SlowFactory {
            clock: Arc::clone(&clock),
            delay: Duration::from_millis(40),
        };
        let engine = Arc::new(SyncEngine::new(config, Arc::new(factory), clock));
        let servers = vec!["slow".to_string()];

        let background = {
            let engine = Arc::clone(&engine);
            let servers = servers.clone();
            thread::spawn(move || engine.sync_any(&servers))
        };
        while !engine.is_in_flight() {
            thread::yield_now();
        }

        assert!(matches!(
            engine.try_sync_any(&servers),
            Err(SyncError::InFlight)
        ));
        // Waits for the background burst instead of failing
        assert!(engine.sync_any(&servers).is_ok());
        assert!(background.join().unwrap().is_ok());
        assert_eq!(engine.history().len(), 2);
    }

    #[test]
    fn test_history_is_bounded() {
        let steps = (0..(HISTORY_CAPACITY as i64 + 3))
            .flat_map(|i| {
                let mut burst = vec![reply(2, i * SECOND)];
                burst.extend([Step::Timeout; 4]);
                burst
            })
            .collect();
        let (engine, _) = engine_with(steps);
        for _ in 0..HISTORY_CAPACITY + 3 {
            engine.sync("scripted").unwrap();
        }
        let history = engine.history();
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert!((history[0].offset_nanos - 3 * SECOND).abs() <= 1);
    }
}
