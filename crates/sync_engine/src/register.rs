//! Committed offset register.
//!
//! A single `AtomicI64`, so readers never observe a partially written offset.

use std::sync::atomic::{AtomicI64, Ordering};

/// Sentinel meaning "no offset committed yet"
const UNSYNCED: i64 = i64::MIN;

/// Lock-free single-writer / many-reader offset cell
#[derive(Debug)]
pub struct OffsetRegister {
    offset_nanos: AtomicI64,
}

impl OffsetRegister {
    /// Create an unsynced register
    pub fn new() -> Self {
        Self {
            offset_nanos: AtomicI64::new(UNSYNCED),
        }
    }

    /// Current offset, `None` until the first commit
    #[inline]
    pub fn load(&self) -> Option<i64> {
        match self.offset_nanos.load(Ordering::Acquire) {
            UNSYNCED => None,
            offset => Some(offset),
        }
    }

    /// Publish a new offset
    #[inline]
    pub fn store(&self, offset_nanos: i64) {
        // i64::MIN is reserved; one nanosecond off is far below SNTP precision
        let value = offset_nanos.max(UNSYNCED + 1);
        self.offset_nanos.store(value, Ordering::Release);
    }

    /// Whether an offset was ever committed
    #[inline]
    pub fn is_synced(&self) -> bool {
        self.load().is_some()
    }
}

impl Default for OffsetRegister {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_starts_unsynced() {
        let register = OffsetRegister::new();
        assert_eq!(register.load(), None);
        assert!(!register.is_synced());
    }

    #[test]
    fn test_register_store_load() {
        let register = OffsetRegister::new();
        register.store(-42);
        assert_eq!(register.load(), Some(-42));
        register.store(i64::MIN);
        assert_eq!(register.load(), Some(i64::MIN + 1));
    }
}
