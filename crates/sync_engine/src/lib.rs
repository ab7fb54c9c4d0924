//! # Sync Engine
//!
//! Network time synchronisation over SNTP.
//!
//! Responsibilities:
//! - NTP timestamp codec and 48-byte packet handling
//! - Burst exchange keeping the lowest-RTT sample
//! - Lock-free committed offset register
//! - `PreciseClock` fast read path
//! - Periodic background resync
//!
//! ## Usage Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sync_engine::{SyncEngine, SyncEngineConfig, SystemMonotonic, UdpTransportFactory};
//!
//! let engine = SyncEngine::new(
//!     SyncEngineConfig::default(),
//!     Arc::new(UdpTransportFactory::default()),
//!     Arc::new(SystemMonotonic::new()),
//! );
//! let clock = engine.clock();
//!
//! engine.sync("time.google.com")?;
//! let now = clock.now()?;
//! ```

pub mod codec;
mod clock;
mod engine;
mod error;
mod monotonic;
pub mod packet;
mod periodic;
mod register;
mod udp;

pub use clock::PreciseClock;
pub use engine::{SyncEngine, SyncEngineConfig, HISTORY_CAPACITY};
pub use error::{AttemptError, ClockError, SyncError};
pub use monotonic::{ManualClock, MonotonicSource, SystemMonotonic};
pub use periodic::PeriodicSync;
pub use register::OffsetRegister;
pub use udp::{UdpTransport, UdpTransportFactory, NTP_PORT};

// Re-export contracts types
pub use contracts::{PreciseTime, SyncResult, SyncSample};
