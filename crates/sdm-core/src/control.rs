//! Cooperative cancellation for running transfers.
//!
//! Each task owns one `CancelFlag`. Workers read it between 64 KiB chunks;
//! when set, they close the response stream and return cleanly, leaving
//! partial state on disk. `pause()` sets the flag, a later `start()` clears it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop signal checked by workers at chunk boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Workers stop at the next chunk boundary.
    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Reset before spawning a fresh worker group.
    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_clear_roundtrip() {
        let flag = CancelFlag::new();
        assert!(!flag.is_set());
        flag.set();
        assert!(flag.is_set());
        let clone = flag.clone();
        assert!(clone.is_set());
        clone.clear();
        assert!(!flag.is_set());
    }
}
