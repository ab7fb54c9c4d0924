//! TimeService - composition root for the collaborator-facing API
//!
//! Owns one `SyncEngine` and one `CompensationStore`. Several services can
//! coexist in a process; nothing here is global.

use std::sync::Arc;
use std::time::Duration;

use contracts::{
    AppConfig, CalibrationResult, CompensationState, DisplayInfo, PreciseTime, SyncResult,
};
use parking_lot::Mutex;
use sync_engine::{
    PeriodicSync, PreciseClock, SyncEngine, SyncEngineConfig, SyncError, SystemMonotonic,
    UdpTransportFactory,
};
use tracing::{info, warn};

use crate::error::Result;
use crate::persistence::JsonFilePersistence;
use crate::store::CompensationStore;

/// Time service
pub struct TimeService {
    servers: Vec<String>,
    engine: Arc<SyncEngine>,
    store: Arc<CompensationStore>,
    periodic: Mutex<Option<PeriodicSync>>,
}

impl std::fmt::Debug for TimeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeService")
            .field("servers", &self.servers)
            .field("engine", &self.engine)
            .field("store", &self.store)
            .finish()
    }
}

impl TimeService {
    /// Assemble a service from its parts
    pub fn new(
        servers: Vec<String>,
        engine: Arc<SyncEngine>,
        store: Arc<CompensationStore>,
    ) -> Self {
        Self {
            servers,
            engine,
            store,
            periodic: Mutex::new(None),
        }
    }

    /// Production wiring: UDP transport, OS monotonic clock, JSON state file
    pub fn from_config(config: &AppConfig, display: Arc<dyn DisplayInfo>) -> Self {
        let engine = Arc::new(SyncEngine::new(
            SyncEngineConfig::from(&config.sync),
            Arc::new(UdpTransportFactory::new(config.sync.port)),
            Arc::new(SystemMonotonic::new()),
        ));
        let store = Arc::new(CompensationStore::new(
            engine.clock(),
            Arc::new(JsonFilePersistence::new(
                config.compensation.state_path.clone(),
            )),
            display,
            &config.compensation,
        ));
        Self::new(config.sync.servers.clone(), engine, store)
    }

    /// Display-compensated true time, `None` until synced
    #[inline]
    pub fn compensated_now(&self) -> Option<PreciseTime> {
        self.store.compensated_now().ok()
    }

    /// Uncompensated true time, `None` until synced
    #[inline]
    pub fn now(&self) -> Option<PreciseTime> {
        self.engine.clock().now_or_none()
    }

    /// Run one blocking sync against the configured servers
    ///
    /// Must not be called from the render thread. If a background resync is
    /// running, waits for it to finish and then syncs again.
    pub fn trigger_sync(&self) -> Option<SyncResult> {
        match self.try_sync() {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(error = %e, "sync failed");
                None
            }
        }
    }

    /// Like [`trigger_sync`](Self::trigger_sync) but keeps the failure reason
    pub fn try_sync(&self) -> std::result::Result<SyncResult, SyncError> {
        self.engine.sync_any(&self.servers)
    }

    /// Current display delay in milliseconds
    pub fn current_delay_ms(&self) -> f64 {
        self.store.current_delay_ms()
    }

    /// Whether the delay was calibrated or set manually
    pub fn is_calibrated(&self) -> bool {
        self.store.is_calibrated()
    }

    /// Store a calibration result
    pub fn submit_calibration_result(&self, result: &CalibrationResult) -> Result<CompensationState> {
        self.store.accept(result)
    }

    /// Override the delay by hand
    pub fn submit_manual_delay(&self, delay_ms: f64) -> Result<CompensationState> {
        self.store.set_manual(delay_ms)
    }

    /// Drop back to the heuristic delay
    pub fn reset_compensation(&self) -> Result<CompensationState> {
        self.store.reset()
    }

    /// Start background resync on the current tokio runtime
    ///
    /// Returns `false` if already running, `interval` is zero or no runtime
    /// is available.
    pub fn start_periodic_sync(&self, interval: Duration) -> bool {
        if interval.is_zero() {
            warn!("periodic sync interval must be non-zero");
            return false;
        }
        let mut periodic = self.periodic.lock();
        if periodic.as_ref().is_some_and(|p| !p.is_finished()) {
            return false;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("periodic sync needs a tokio runtime");
            return false;
        }
        *periodic = Some(PeriodicSync::spawn(
            Arc::clone(&self.engine),
            self.servers.clone(),
            interval,
        ));
        true
    }

    /// Stop background resync, if running
    pub async fn stop_periodic_sync(&self) {
        let periodic = self.periodic.lock().take();
        if let Some(periodic) = periodic {
            periodic.shutdown().await;
            info!("periodic sync stopped");
        }
    }

    /// Fast true-time clock
    pub fn clock(&self) -> PreciseClock {
        self.engine.clock()
    }

    /// Underlying sync engine
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Underlying compensation store
    pub fn store(&self) -> &Arc<CompensationStore> {
        &self.store
    }

    /// Configured servers, in try order
    pub fn servers(&self) -> &[String] {
        &self.servers
    }
}
