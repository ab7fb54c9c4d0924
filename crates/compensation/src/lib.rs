//! # Compensation
//!
//! Display delay compensation and the collaborator-facing time service.
//!
//! Responsibilities:
//! - Clamped, atomically persisted delay triple (`CompensationStore`)
//! - JSON file and in-memory persistence backends
//! - Refresh-rate heuristic when no calibration exists
//! - `TimeService` composition root: sync, compensated time, calibration intake
//!
//! ## Usage Example
//!
//! ```ignore
//! use compensation::TimeService;
//! use contracts::{AppConfig, FixedDisplay};
//!
//! let service = TimeService::from_config(&config, Arc::new(FixedDisplay::new(120.0)));
//! service.trigger_sync();
//! service.start_periodic_sync(config.sync.resync_interval());
//!
//! // every rendered frame
//! if let Some(now) = service.compensated_now() {
//!     draw_time(now);
//! }
//! ```

mod error;
mod persistence;
mod service;
mod store;

// Re-exports
pub use error::{CompensationError, Result};
pub use persistence::{JsonFilePersistence, MemoryPersistence};
pub use service::TimeService;
pub use store::{heuristic_delay_nanos, CompensationStore};
