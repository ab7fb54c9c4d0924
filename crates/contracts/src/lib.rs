//! # Contracts
//!
//! Frozen interface contracts shared by every truetime crate: the data model,
//! the error taxonomy and the capability traits behind which platform
//! collaborators (network, camera, display, storage) are hidden.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Local clock readings are monotonic nanoseconds (`i64`) from an arbitrary origin
//! - True time is nanoseconds since the Unix epoch (`i64`)
//! - `offset = true - monotonic`, so `true = monotonic + offset`

mod calibration;
mod compensation;
mod config;
mod error;
mod frame_source;
mod time;
mod transport;

pub use calibration::*;
pub use compensation::*;
pub use config::*;
pub use error::*;
pub use frame_source::{CameraFrame, FrameCallback, FrameSource};
pub use time::*;
pub use transport::{SntpTransport, TransportFactory};
