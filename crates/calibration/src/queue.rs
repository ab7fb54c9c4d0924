//! Flash timestamp hand-off queue
//!
//! Producer: flash scheduler. Consumer: frame-processing callback.
//! Both ends are non-blocking; a full queue drops the newest timestamp.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{trace, warn};

/// Bounded, non-blocking queue of flash emission timestamps
#[derive(Debug, Clone)]
pub struct FlashQueue {
    tx: Sender<i64>,
    rx: Receiver<i64>,
    dropped: Arc<AtomicU64>,
}

impl FlashQueue {
    /// Create a queue holding at most `capacity` pending flashes
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enqueue a flash timestamp without blocking
    ///
    /// Returns `false` if the timestamp was dropped.
    pub fn try_push(&self, timestamp_nanos: i64) -> bool {
        match self.tx.try_send(timestamp_nanos) {
            Ok(()) => {
                trace!(timestamp_nanos, "flash queued");
                true
            }
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("truetime_calibration_flashes_dropped_total").increment(1);
                trace!(timestamp_nanos, "flash dropped (queue full)");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("flash queue closed");
                false
            }
        }
    }

    /// Dequeue the oldest pending flash, if any
    pub fn try_pop(&self) -> Option<i64> {
        self.rx.try_recv().ok()
    }

    /// Discard every pending flash
    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }

    /// Pending flashes
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no flash is pending
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Maximum number of pending flashes
    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(0)
    }

    /// Flashes dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
