//! # Integration Tests
//!
//! Cross-crate and end-to-end tests.
//!
//! Covers:
//! - Configuration round trips
//! - SNTP over a loopback UDP responder
//! - Concurrent reads against commits (no torn values)
//! - Simulated calibration feeding the compensation store

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::AppConfig;

    #[test]
    fn test_default_config_round_trips() {
        let config = AppConfig::default();
        ConfigLoader::validate(&config).unwrap();

        let toml = ConfigLoader::to_toml(&config).unwrap();
        let parsed = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
        assert_eq!(parsed.sync.servers, config.sync.servers);
        assert_eq!(parsed.sync.burst_size, config.sync.burst_size);
        assert_eq!(
            parsed.compensation.state_path,
            config.compensation.state_path
        );

        let json = ConfigLoader::to_json(&config).unwrap();
        let parsed = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(parsed.calibration.min_samples, config.calibration.min_samples);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("truetime.toml");
        std::fs::write(&path, "[sync]\nservers = [\"127.0.0.1:1123\"]\n").unwrap();

        let config = ConfigLoader::load_from_path(&path).unwrap();
        assert_eq!(config.sync.servers, vec!["127.0.0.1:1123"]);
        assert_eq!(config.sync.burst_size, 5);
        assert_eq!(config.calibration.flash_queue_capacity, 16);
    }
}

#[cfg(test)]
mod sntp_loopback_tests {
    use std::net::UdpSocket;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use contracts::NANOS_PER_MILLI;
    use sync_engine::packet::build_response;
    use sync_engine::{SyncEngine, SyncEngineConfig, SystemMonotonic, UdpTransportFactory};

    /// Server clock runs this far ahead of the host clock
    const SERVER_SKEW_NANOS: i64 = 5_000 * NANOS_PER_MILLI;

    fn unix_nanos() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos() as i64
    }

    /// Minimal SNTP responder on an ephemeral loopback port
    struct Responder {
        port: u16,
        running: Arc<AtomicBool>,
        handle: Option<thread::JoinHandle<u32>>,
    }

    impl Responder {
        fn start() -> Self {
            Self::with_first_reply_delay(Duration::ZERO)
        }

        /// Holds the first reply back by `delay` before answering normally
        fn with_first_reply_delay(delay: Duration) -> Self {
            let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
            socket
                .set_read_timeout(Some(Duration::from_millis(50)))
                .unwrap();
            let port = socket.local_addr().unwrap().port();
            let running = Arc::new(AtomicBool::new(true));

            let flag = Arc::clone(&running);
            let handle = thread::spawn(move || {
                let mut buf = [0u8; 64];
                let mut answered = 0;
                while flag.load(Ordering::Relaxed) {
                    let Ok((len, peer)) = socket.recv_from(&mut buf) else {
                        continue;
                    };
                    if len != 48 || buf[0] != 0x1B {
                        continue;
                    }
                    if answered == 0 && !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    let response = build_response(unix_nanos() + SERVER_SKEW_NANOS);
                    socket.send_to(&response, peer).unwrap();
                    answered += 1;
                }
                answered
            });

            Self {
                port,
                running,
                handle: Some(handle),
            }
        }

        fn stop(mut self) -> u32 {
            self.running.store(false, Ordering::Relaxed);
            self.handle.take().unwrap().join().unwrap()
        }
    }

    #[test]
    fn test_sync_against_loopback_server() {
        let responder = Responder::start();
        let engine = SyncEngine::new(
            SyncEngineConfig {
                burst_size: 5,
                timeout: Duration::from_millis(500),
                sample_pause: Duration::ZERO,
            },
            Arc::new(UdpTransportFactory::new(responder.port)),
            Arc::new(SystemMonotonic::new()),
        );

        let result = engine.sync("127.0.0.1").unwrap();
        assert_eq!(result.samples_used, 5);
        assert!(result.rtt_nanos >= 0);
        assert!(result.rtt_nanos < 100 * NANOS_PER_MILLI);

        let now = engine.clock().now().unwrap();
        let expected = unix_nanos() + SERVER_SKEW_NANOS;
        assert!((now.as_unix_nanos() - expected).abs() < 50 * NANOS_PER_MILLI);

        assert_eq!(responder.stop(), 5);
    }

    #[test]
    fn test_late_reply_is_not_paired_with_next_request() {
        // First reply lands after its attempt timed out, during the pause
        let responder = Responder::with_first_reply_delay(Duration::from_millis(120));
        let engine = SyncEngine::new(
            SyncEngineConfig {
                burst_size: 5,
                timeout: Duration::from_millis(100),
                sample_pause: Duration::from_millis(50),
            },
            Arc::new(UdpTransportFactory::new(responder.port)),
            Arc::new(SystemMonotonic::new()),
        );

        let result = engine.sync("127.0.0.1").unwrap();
        assert_eq!(result.samples_used, 4);

        let now = engine.clock().now().unwrap();
        let error = now.as_unix_nanos() - (unix_nanos() + SERVER_SKEW_NANOS);
        assert!(
            error.abs() < 5 * NANOS_PER_MILLI,
            "committed offset off by {} ms",
            error as f64 / NANOS_PER_MILLI as f64
        );

        responder.stop();
    }

    #[test]
    fn test_explicit_port_in_server_name() {
        let responder = Responder::start();
        // Factory port is ignored when the server carries its own
        let engine = SyncEngine::new(
            SyncEngineConfig {
                burst_size: 2,
                timeout: Duration::from_millis(500),
                sample_pause: Duration::ZERO,
            },
            Arc::new(UdpTransportFactory::new(9)),
            Arc::new(SystemMonotonic::new()),
        );

        let server = format!("127.0.0.1:{}", responder.port);
        let result = engine.sync(&server).unwrap();
        assert_eq!(result.server, server);
        responder.stop();
    }

    #[test]
    fn test_unanswered_burst_keeps_clock_unsynced() {
        // Bound but silent: every attempt times out
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = silent.local_addr().unwrap().port();
        let engine = SyncEngine::new(
            SyncEngineConfig {
                burst_size: 2,
                timeout: Duration::from_millis(50),
                sample_pause: Duration::ZERO,
            },
            Arc::new(UdpTransportFactory::new(port)),
            Arc::new(SystemMonotonic::new()),
        );

        assert!(engine.sync("127.0.0.1").is_err());
        assert!(!engine.clock().is_synced());
    }
}

#[cfg(test)]
mod concurrency_tests {
    use std::io;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use compensation::{CompensationStore, MemoryPersistence};
    use contracts::{
        CalibrationResult, CompensationSettings, FixedDisplay, SntpTransport, TransportFactory,
        NANOS_PER_MILLI, PRECISION_UNKNOWN,
    };
    use sync_engine::packet::build_response;
    use sync_engine::{ManualClock, MonotonicSource, SyncEngine, SyncEngineConfig};

    const READERS: usize = 4;
    const READS_PER_THREAD: usize = 1_000;

    /// Server answering instantly with `local + offset`
    struct ShiftedServer {
        clock: Arc<ManualClock>,
        offset: Arc<AtomicI64>,
    }

    impl TransportFactory for ShiftedServer {
        fn open(&self, _server: &str, _timeout: Duration) -> io::Result<Box<dyn SntpTransport>> {
            Ok(Box::new(ShiftedServer {
                clock: Arc::clone(&self.clock),
                offset: Arc::clone(&self.offset),
            }))
        }
    }

    impl SntpTransport for ShiftedServer {
        fn send(&mut self, _request: &[u8]) -> io::Result<()> {
            Ok(())
        }

        fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let stamp = self.clock.now_nanos() + self.offset.load(Ordering::SeqCst);
            let response = build_response(stamp);
            buf[..response.len()].copy_from_slice(&response);
            Ok(response.len())
        }
    }

    #[test]
    fn test_reads_during_commit_see_old_or_new_offset() {
        let clock = Arc::new(ManualClock::new(1_000 * NANOS_PER_MILLI));
        let offset = Arc::new(AtomicI64::new(1_700_000_000_000_000_000));
        let engine = Arc::new(SyncEngine::new(
            SyncEngineConfig {
                sample_pause: Duration::ZERO,
                ..Default::default()
            },
            Arc::new(ShiftedServer {
                clock: Arc::clone(&clock),
                offset: Arc::clone(&offset),
            }),
            clock.clone(),
        ));
        let store = Arc::new(CompensationStore::new(
            engine.clock(),
            Arc::new(MemoryPersistence::new()),
            Arc::new(FixedDisplay::new(60.0)),
            &CompensationSettings::default(),
        ));
        let delay = store.snapshot().delay_nanos;

        let before = engine.sync("shifted").unwrap().offset_nanos;
        offset.store(1_800_000_000_000_000_000, Ordering::SeqCst);

        let local = clock.now_nanos();
        let barrier = Arc::new(Barrier::new(READERS + 1));
        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    (0..READS_PER_THREAD)
                        .map(|_| store.compensated_now().unwrap().as_unix_nanos())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        barrier.wait();
        let after = engine.sync("shifted").unwrap().offset_nanos;
        assert_ne!(before, after);

        for reader in readers {
            for value in reader.join().unwrap() {
                assert!(
                    value == local + before + delay || value == local + after + delay,
                    "torn read: {value}"
                );
            }
        }
    }

    #[test]
    fn test_snapshot_never_mixes_two_writes() {
        let clock = Arc::new(ManualClock::new(0));
        let engine = SyncEngine::new(
            SyncEngineConfig::default(),
            Arc::new(ShiftedServer {
                clock: Arc::clone(&clock),
                offset: Arc::new(AtomicI64::new(0)),
            }),
            clock,
        );
        let store = Arc::new(CompensationStore::new(
            engine.clock(),
            Arc::new(MemoryPersistence::new()),
            Arc::new(FixedDisplay::new(60.0)),
            &CompensationSettings::default(),
        ));
        let calibrated = CalibrationResult {
            median_delay_ms: 10.0,
            mean_delay_ms: 10.0,
            std_dev_ms: 1.0,
            sample_count: 25,
            outlier_count: 0,
            estimated_precision_ms: 0.2,
        };

        let barrier = Arc::new(Barrier::new(READERS + 1));
        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    (0..READS_PER_THREAD)
                        .map(|_| store.snapshot())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        barrier.wait();
        for i in 0..200 {
            if i % 2 == 0 {
                store.accept(&calibrated).unwrap();
            } else {
                store.set_manual(20.0).unwrap();
            }
        }

        for reader in readers {
            for state in reader.join().unwrap() {
                match state.delay_nanos {
                    d if d == 10 * NANOS_PER_MILLI => assert_eq!(state.precision_ms, 0.2),
                    d if d == 20 * NANOS_PER_MILLI => {
                        assert_eq!(state.precision_ms, PRECISION_UNKNOWN)
                    }
                    // Heuristic state before the first write
                    _ => assert!(!state.is_calibrated()),
                }
            }
        }
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::io;
    use std::sync::Arc;
    use std::time::Duration;

    use calibration::{
        CalibrationSession, FlashScheduler, SimulatedCamera, SimulatedCameraConfig,
        SimulatedDisplay,
    };
    use compensation::{JsonFilePersistence, TimeService};
    use contracts::{
        CalibrationParams, CalibrationSettings, CalibrationState, CompensationSettings,
        FixedDisplay, SntpTransport, TransportFactory, NANOS_PER_MILLI,
    };
    use sync_engine::packet::build_response;
    use sync_engine::{
        ManualClock, MonotonicSource, SyncEngine, SyncEngineConfig, SystemMonotonic,
    };

    const DISPLAY_LATENCY_MS: u64 = 30;

    struct EpochServer {
        clock: Arc<ManualClock>,
    }

    impl TransportFactory for EpochServer {
        fn open(&self, _server: &str, _timeout: Duration) -> io::Result<Box<dyn SntpTransport>> {
            Ok(Box::new(EpochServer {
                clock: Arc::clone(&self.clock),
            }))
        }
    }

    impl SntpTransport for EpochServer {
        fn send(&mut self, _request: &[u8]) -> io::Result<()> {
            Ok(())
        }

        fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let response = build_response(self.clock.now_nanos() + 1_700_000_000_000_000_000);
            buf[..response.len()].copy_from_slice(&response);
            Ok(response.len())
        }
    }

    fn time_service(state_path: &std::path::Path) -> TimeService {
        let clock = Arc::new(ManualClock::new(0));
        let engine = Arc::new(SyncEngine::new(
            SyncEngineConfig {
                sample_pause: Duration::ZERO,
                ..Default::default()
            },
            Arc::new(EpochServer {
                clock: Arc::clone(&clock),
            }),
            clock,
        ));
        let store = Arc::new(compensation::CompensationStore::new(
            engine.clock(),
            Arc::new(JsonFilePersistence::new(state_path)),
            Arc::new(FixedDisplay::new(60.0)),
            &CompensationSettings::default(),
        ));
        TimeService::new(vec!["epoch".to_string()], engine, store)
    }

    /// Simulated rig: flashes -> display -> camera -> session -> analyzer
    fn run_simulated_calibration() -> CalibrationState {
        let monotonic: Arc<dyn MonotonicSource> = Arc::new(SystemMonotonic::new());
        let display = Arc::new(SimulatedDisplay::new(60.0));
        let camera = Arc::new(SimulatedCamera::new(
            SimulatedCameraConfig {
                fps: 240.0,
                display_latency: Duration::from_millis(DISPLAY_LATENCY_MS),
                jitter: Duration::ZERO,
                ..Default::default()
            },
            Arc::clone(&display),
            Arc::clone(&monotonic),
        ));

        let params = CalibrationParams {
            flash_duration_ms: 20,
            flash_period_ms: 100,
            run_duration_secs: 1.5,
            ..CalibrationParams::for_fps(240.0)
        };
        let session = Arc::new(CalibrationSession::new(CalibrationSettings {
            min_samples: 5,
            ..Default::default()
        }));
        session.start_calibration(params, camera).unwrap();

        let flash_session = Arc::clone(&session);
        let scheduler = FlashScheduler::start(
            &params,
            monotonic,
            display,
            Arc::new(move |ts| flash_session.on_flash_emitted(ts)),
        );

        let state = session.wait_for_completion(Duration::from_secs(10));
        scheduler.stop();
        state
    }

    #[test]
    fn test_simulated_calibration_feeds_compensation() {
        let CalibrationState::Completed { result } = run_simulated_calibration() else {
            panic!("calibration did not complete");
        };
        observability::record_calibration_result(&result);

        let latency = DISPLAY_LATENCY_MS as f64;
        assert!(result.sample_count >= 5);
        assert!(result.median_delay_ms >= latency);
        // One 240 fps frame interval plus scheduling slack
        assert!(result.median_delay_ms < latency + 15.0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compensation.json");
        let service = time_service(&path);
        assert!(!service.is_calibrated());

        let stored = service.submit_calibration_result(&result).unwrap();
        assert!(service.is_calibrated());
        assert!((stored.delay_ms() - result.median_delay_ms).abs() < 1e-6);

        service.trigger_sync().unwrap();
        let raw = service.now().unwrap();
        let compensated = service.compensated_now().unwrap();
        assert_eq!(
            compensated.as_unix_nanos() - raw.as_unix_nanos(),
            stored.delay_nanos
        );

        // A fresh service over the same file picks the calibration up
        let reloaded = time_service(&path).store().snapshot();
        assert_eq!(reloaded.delay_nanos, stored.delay_nanos);
        assert_eq!(
            reloaded.calibrated_at_epoch_millis,
            stored.calibrated_at_epoch_millis
        );
        assert!((reloaded.precision_ms - stored.precision_ms).abs() < 1e-9);
    }

    #[test]
    fn test_reset_returns_to_heuristic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compensation.json");
        let service = time_service(&path);
        let heuristic = service.store().snapshot();

        service.submit_manual_delay(42.0).unwrap();
        assert!(path.exists());

        let state = service.reset_compensation().unwrap();
        assert_eq!(state, heuristic);
        assert!(!path.exists());
        // 2 frames at 60 Hz plus the fixed base
        assert_eq!(state.delay_nanos / NANOS_PER_MILLI, 43);
    }

    #[tokio::test]
    async fn test_periodic_sync_through_service() {
        let dir = tempfile::tempdir().unwrap();
        let service = time_service(&dir.path().join("state.json"));

        assert!(service.start_periodic_sync(Duration::from_millis(20)));
        assert!(!service.start_periodic_sync(Duration::from_millis(20)));

        for _ in 0..100 {
            if service.compensated_now().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        service.stop_periodic_sync().await;

        assert!(service.compensated_now().is_some());
        assert!(!service.engine().history().is_empty());
    }
}
